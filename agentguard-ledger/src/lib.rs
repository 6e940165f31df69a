//! AgentGuard Ledger - append-only forensic event store
//!
//! Defines the `EventLedger` contract (§4.5) and ships two backends: an
//! in-memory ephemeral ledger for tests and single-process deployments, and
//! a durable relational backend over PostgreSQL for anything that needs to
//! survive a restart.

mod memory;
mod postgres;

use agentguard_core::{
    AgentGraphData, AgentId, AgentProfile, Decision, Event, EventId, GuardResult, LedgerStats,
    SessionId, Timestamp, TimelineSummary,
};
use async_trait::async_trait;

pub use memory::InMemoryEventLedger;
pub use postgres::PostgresEventLedger;

/// Filter parameters for [`EventLedger::list_events`]. `since`/`until` are
/// interpreted as UTC when naive (§4.5).
#[derive(Debug, Clone, Default)]
pub struct EventFilters {
    pub session_id: Option<SessionId>,
    pub decision: Option<Decision>,
    pub min_risk: Option<f64>,
    pub max_risk: Option<f64>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Append-only forensic event store. `append` MUST NOT be exposed as
/// update or delete by any implementation; every other method is a pure
/// read/aggregate over what has been appended.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Durable append. Concurrent appends for distinct events must not
    /// interleave partially.
    async fn append(&self, event: Event) -> GuardResult<()>;

    async fn get_event(&self, id: EventId) -> GuardResult<Option<Event>>;

    /// Ordered by timestamp descending.
    async fn list_events(&self, filters: EventFilters) -> GuardResult<Vec<Event>>;

    /// All events for a session, ordered ascending.
    async fn get_timeline(&self, session_id: SessionId) -> GuardResult<Vec<Event>>;

    /// Distinct session ids, unordered.
    async fn list_sessions(&self) -> GuardResult<Vec<SessionId>>;

    /// `None` if the session has no events.
    async fn get_timeline_summary(&self, session_id: SessionId) -> GuardResult<Option<TimelineSummary>>;

    /// Process-wide counters; zeros on an empty ledger.
    async fn get_stats(&self) -> GuardResult<LedgerStats>;

    /// Distinct agent ids, unordered.
    async fn list_agents(&self) -> GuardResult<Vec<AgentId>>;

    async fn get_agent_profile(&self, agent_id: AgentId) -> GuardResult<Option<AgentProfile>>;

    async fn get_agent_graph(&self, agent_id: AgentId) -> GuardResult<AgentGraphData>;
}
