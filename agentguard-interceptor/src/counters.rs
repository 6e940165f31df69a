//! Per-session action/block counters (§4.4 step 8, §5 shared-resource model).
//!
//! One process-local mutex guards the whole map — the session-limit check
//! and the subsequent increment must be linearisable against each other, and
//! the map is small and short-lived enough that a single lock is simpler
//! than per-entry locking.

use agentguard_core::SessionId;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCounts {
    pub actions: u64,
    pub blocked: u64,
}

#[derive(Default)]
pub struct SessionCounters {
    inner: Mutex<HashMap<SessionId, SessionCounts>>,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters for `session_id`, zeroed if never seen.
    pub fn get(&self, session_id: SessionId) -> SessionCounts {
        let inner = self.inner.lock().expect("session counters mutex poisoned");
        inner.get(&session_id).copied().unwrap_or_default()
    }

    /// Increment `actions` unconditionally, and `blocked` when `blocked` is
    /// true, returning the counts as they stood *before* this call (the
    /// values the session-limit check should have been evaluated against).
    pub fn record(&self, session_id: SessionId, blocked: bool) -> SessionCounts {
        let mut inner = self.inner.lock().expect("session counters mutex poisoned");
        let entry = inner.entry(session_id).or_default();
        let before = *entry;
        entry.actions += 1;
        if blocked {
            entry.blocked += 1;
        }
        before
    }

    /// Remove a session's counters entirely (explicit clearing, §5).
    pub fn clear(&self, session_id: SessionId) {
        let mut inner = self.inner.lock().expect("session counters mutex poisoned");
        inner.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_session_starts_at_zero() {
        let counters = SessionCounters::new();
        let counts = counters.get(SessionId::now_v7());
        assert_eq!(counts.actions, 0);
        assert_eq!(counts.blocked, 0);
    }

    #[test]
    fn record_increments_actions_always_and_blocked_conditionally() {
        let counters = SessionCounters::new();
        let session = SessionId::now_v7();
        counters.record(session, false);
        counters.record(session, true);
        counters.record(session, true);
        let counts = counters.get(session);
        assert_eq!(counts.actions, 3);
        assert_eq!(counts.blocked, 2);
    }

    #[test]
    fn clear_resets_a_session() {
        let counters = SessionCounters::new();
        let session = SessionId::now_v7();
        counters.record(session, true);
        counters.clear(session);
        let counts = counters.get(session);
        assert_eq!(counts.actions, 0);
    }
}
