//! Bounded, insertion-ordered insight store (§4.7).
//!
//! Holds the most recently produced [`EnrichmentInsight`] per event, capped
//! at a configurable capacity. Re-inserting an existing key moves it back to
//! the front rather than leaving it at its old position, so `list_recent`
//! always reflects true recency of `put` calls rather than of original
//! insertion.

use agentguard_core::{EnrichmentInsight, EventId};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Default capacity when none is configured (`AGENTGUARD_INSIGHT_STORE_CAPACITY`).
pub const DEFAULT_CAPACITY: usize = 1000;

struct Inner {
    order: VecDeque<EventId>,
    insights: HashMap<EventId, EnrichmentInsight>,
    capacity: usize,
}

/// Process-wide store of the latest insight per event. Safe to share behind
/// an `Arc`; all mutation goes through an internal mutex.
pub struct InsightStore {
    inner: Mutex<Inner>,
}

impl InsightStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                insights: HashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn from_env() -> Self {
        let capacity = std::env::var("AGENTGUARD_INSIGHT_STORE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CAPACITY);
        Self::new(capacity)
    }

    /// Insert or replace the insight for `insight.event_id`, moving it to
    /// the front of recency order. Evicts the oldest entry if this insert
    /// pushes the store past capacity.
    pub fn put(&self, insight: EnrichmentInsight) {
        let mut inner = self.inner.lock().expect("insight store mutex poisoned");
        let event_id = insight.event_id;

        if let Some(pos) = inner.order.iter().position(|id| *id == event_id) {
            inner.order.remove(pos);
        }
        inner.order.push_front(event_id);
        inner.insights.insert(event_id, insight);

        while inner.order.len() > inner.capacity {
            if let Some(oldest) = inner.order.pop_back() {
                inner.insights.remove(&oldest);
            }
        }
    }

    pub fn get(&self, event_id: EventId) -> Option<EnrichmentInsight> {
        let inner = self.inner.lock().expect("insight store mutex poisoned");
        inner.insights.get(&event_id).cloned()
    }

    /// Most recent `n` insights, front-to-back (index 0 is the latest `put`).
    pub fn list_recent(&self, n: usize) -> Vec<EnrichmentInsight> {
        let inner = self.inner.lock().expect("insight store mutex poisoned");
        inner
            .order
            .iter()
            .take(n)
            .filter_map(|id| inner.insights.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("insight store mutex poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentguard_core::{AttackPattern, InsightId, Severity};

    fn insight(event_id: EventId) -> EnrichmentInsight {
        EnrichmentInsight {
            insight_id: InsightId::now_v7(),
            event_id,
            attack_pattern: AttackPattern::None,
            confidence: 0.5,
            severity: Severity::Low,
            summary: "s".to_string(),
            recommended_action: "r".to_string(),
            false_positive_likelihood: 0.1,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn put_put_put_moves_repeated_key_to_front() {
        let store = InsightStore::new(10);
        let x = EventId::now_v7();
        let y = EventId::now_v7();

        store.put(insight(x));
        store.put(insight(x));
        store.put(insight(y));

        let recent = store.list_recent(10);
        let ids: Vec<EventId> = recent.iter().map(|i| i.event_id).collect();
        assert_eq!(ids, vec![y, x]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn overflow_evicts_oldest_by_insertion() {
        let store = InsightStore::new(2);
        let a = EventId::now_v7();
        let b = EventId::now_v7();
        let c = EventId::now_v7();

        store.put(insight(a));
        store.put(insight(b));
        store.put(insight(c));

        assert_eq!(store.len(), 2);
        assert!(store.get(a).is_none());
        assert!(store.get(b).is_some());
        assert!(store.get(c).is_some());

        let ids: Vec<EventId> = store.list_recent(10).iter().map(|i| i.event_id).collect();
        assert_eq!(ids, vec![c, b]);
    }

    #[test]
    fn empty_store_returns_none_and_empty_list() {
        let store = InsightStore::new(10);
        assert!(store.is_empty());
        assert!(store.get(EventId::now_v7()).is_none());
        assert!(store.list_recent(5).is_empty());
    }
}
