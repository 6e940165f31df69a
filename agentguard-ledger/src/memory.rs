//! Ephemeral, in-process `EventLedger` backend.

use crate::{EventFilters, EventLedger};
use agentguard_core::{
    AgentGraphData, AgentId, AgentProfile, Decision, Event, EventId, GraphEdge, GraphEdgeKind,
    GraphNode, GraphNodeKind, GuardError, GuardResult, LedgerError, LedgerStats, SessionId,
    TimelineSummary,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// How many of the most-recent indicators/tools/risk-scores an
/// [`AgentProfile`] carries before truncating the trailing window.
const PROFILE_WINDOW: usize = 50;

#[derive(Default)]
struct Inner {
    events: HashMap<EventId, Event>,
    /// Insertion order per session, oldest first — `get_timeline` reads
    /// this directly rather than re-sorting by timestamp.
    session_order: HashMap<SessionId, Vec<EventId>>,
}

/// In-memory ledger guarded by a single mutex for writes; reads take the
/// same lock, which is cheap enough here that a separate read path buys
/// nothing.
#[derive(Default)]
pub struct InMemoryEventLedger {
    inner: Mutex<Inner>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn append(&self, event: Event) -> GuardResult<()> {
        let mut inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        inner.session_order.entry(event.session_id).or_default().push(event.event_id);
        inner.events.insert(event.event_id, event);
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> GuardResult<Option<Event>> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        Ok(inner.events.get(&id).cloned())
    }

    async fn list_events(&self, filters: EventFilters) -> GuardResult<Vec<Event>> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        let mut matched: Vec<Event> = inner
            .events
            .values()
            .filter(|e| filters.session_id.map_or(true, |s| e.session_id == s))
            .filter(|e| filters.decision.map_or(true, |d| e.decision == d))
            .filter(|e| filters.min_risk.map_or(true, |m| e.assessment.risk_score() >= m))
            .filter(|e| filters.max_risk.map_or(true, |m| e.assessment.risk_score() <= m))
            .filter(|e| filters.since.map_or(true, |s| e.timestamp >= s))
            .filter(|e| filters.until.map_or(true, |u| e.timestamp <= u))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let start = filters.offset.min(matched.len());
        let end = filters
            .limit
            .map(|l| (start + l).min(matched.len()))
            .unwrap_or(matched.len());
        Ok(matched[start..end].to_vec())
    }

    async fn get_timeline(&self, session_id: SessionId) -> GuardResult<Vec<Event>> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        Ok(inner
            .session_order
            .get(&session_id)
            .map(|ids| ids.iter().filter_map(|id| inner.events.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn list_sessions(&self) -> GuardResult<Vec<SessionId>> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        Ok(inner.session_order.keys().copied().collect())
    }

    async fn get_timeline_summary(&self, session_id: SessionId) -> GuardResult<Option<TimelineSummary>> {
        let timeline = self.get_timeline(session_id).await?;
        Ok(build_timeline_summary(session_id, &timeline))
    }

    async fn get_stats(&self) -> GuardResult<LedgerStats> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        if inner.events.is_empty() {
            return Ok(LedgerStats::default());
        }
        let mut blocked = 0u64;
        let mut reviewed = 0u64;
        let mut allowed = 0u64;
        let mut sum_risk = 0.0;
        for event in inner.events.values() {
            match event.decision {
                Decision::Block => blocked += 1,
                Decision::Review => reviewed += 1,
                Decision::Allow => allowed += 1,
            }
            sum_risk += event.assessment.risk_score();
        }
        Ok(LedgerStats {
            total_events: inner.events.len() as u64,
            blocked_events: blocked,
            reviewed_events: reviewed,
            allowed_events: allowed,
            active_sessions: inner.session_order.len() as u64,
            avg_risk_score: sum_risk / inner.events.len() as f64,
        })
    }

    async fn list_agents(&self) -> GuardResult<Vec<AgentId>> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        let mut seen = HashSet::new();
        Ok(inner
            .events
            .values()
            .filter(|e| seen.insert(e.agent_id))
            .map(|e| e.agent_id)
            .collect())
    }

    async fn get_agent_profile(&self, agent_id: AgentId) -> GuardResult<Option<AgentProfile>> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        let mut events: Vec<&Event> = inner.events.values().filter(|e| e.agent_id == agent_id).collect();
        if events.is_empty() {
            return Ok(None);
        }
        events.sort_by_key(|e| e.timestamp);

        let mut sessions = HashSet::new();
        let mut blocked = 0u64;
        let mut reviewed = 0u64;
        let mut allowed = 0u64;
        let mut sum_risk = 0.0;
        let mut max_risk = f64::MIN;
        let mut is_registered = false;
        let mut attack_patterns = Vec::new();
        let mut tools_used = Vec::new();
        let mut risk_trend = Vec::new();

        for event in &events {
            sessions.insert(event.session_id);
            match event.decision {
                Decision::Block => blocked += 1,
                Decision::Review => reviewed += 1,
                Decision::Allow => allowed += 1,
            }
            let score = event.assessment.risk_score();
            sum_risk += score;
            max_risk = max_risk.max(score);
            is_registered = is_registered || event.agent_is_registered;
            risk_trend.push(score);
            if !tools_used.contains(&event.action.tool_name) {
                tools_used.push(event.action.tool_name.clone());
            }
            if event.decision != Decision::Allow {
                for indicator in &event.assessment.indicators {
                    if !attack_patterns.contains(indicator) {
                        attack_patterns.push(indicator.clone());
                    }
                }
            }
        }

        let last = events.last().expect("events is non-empty");
        let first = events.first().expect("events is non-empty");

        if risk_trend.len() > PROFILE_WINDOW {
            let start = risk_trend.len() - PROFILE_WINDOW;
            risk_trend = risk_trend[start..].to_vec();
        }
        attack_patterns.reverse();
        attack_patterns.truncate(PROFILE_WINDOW);
        tools_used.reverse();
        tools_used.truncate(PROFILE_WINDOW);

        Ok(Some(AgentProfile {
            agent_id,
            agent_goal: last.agent_goal.clone(),
            is_registered,
            framework: last.framework.clone(),
            first_seen: first.timestamp,
            last_seen: last.timestamp,
            total_sessions: sessions.len() as u64,
            total_events: events.len() as u64,
            blocked_events: blocked,
            reviewed_events: reviewed,
            allowed_events: allowed,
            avg_risk_score: sum_risk / events.len() as f64,
            max_risk_score: max_risk,
            attack_patterns,
            tools_used,
            risk_trend,
        }))
    }

    async fn get_agent_graph(&self, agent_id: AgentId) -> GuardResult<AgentGraphData> {
        let inner = self.inner.lock().map_err(|_| GuardError::Ledger(LedgerError::LockPoisoned))?;
        let events: Vec<Event> =
            inner.events.values().filter(|e| e.agent_id == agent_id).cloned().collect();
        Ok(build_agent_graph(agent_id, &events))
    }
}

/// Shared across both backends: a session's timeline, aggregated into its
/// rollup. `None` if the timeline is empty.
pub(crate) fn build_timeline_summary(session_id: SessionId, timeline: &[Event]) -> Option<TimelineSummary> {
    if timeline.is_empty() {
        return None;
    }
    let mut blocked = 0u64;
    let mut reviewed = 0u64;
    let mut allowed = 0u64;
    let mut max_risk = f64::MIN;
    let mut sum_risk = 0.0;
    let mut attack_vectors: Vec<String> = Vec::new();
    let mut seen_vectors = HashSet::new();

    for event in timeline {
        match event.decision {
            Decision::Block => blocked += 1,
            Decision::Review => reviewed += 1,
            Decision::Allow => allowed += 1,
        }
        let score = event.assessment.risk_score();
        max_risk = max_risk.max(score);
        sum_risk += score;
        if event.decision == Decision::Block {
            for indicator in &event.assessment.indicators {
                if seen_vectors.insert(indicator.clone()) {
                    attack_vectors.push(indicator.clone());
                }
            }
        }
    }

    Some(TimelineSummary {
        session_id,
        total_events: timeline.len() as u64,
        blocked_events: blocked,
        reviewed_events: reviewed,
        allowed_events: allowed,
        max_risk_score: max_risk,
        avg_risk_score: sum_risk / timeline.len() as f64,
        start_time: timeline.first().map(|e| e.timestamp),
        end_time: timeline.last().map(|e| e.timestamp),
        attack_vectors,
    })
}

/// Shared across both backends: an agent's events, rendered into the
/// agent/session/tool/indicator graph.
pub(crate) fn build_agent_graph(agent_id: AgentId, events: &[Event]) -> AgentGraphData {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut seen_sessions = HashSet::new();
    let mut seen_tools = HashSet::new();
    let mut seen_indicators = HashSet::new();
    let mut seen_session_tool_edges = HashSet::new();
    let mut seen_tool_indicator_edges = HashSet::new();

    let agent_node_id = format!("agent:{agent_id}");
    nodes.push(GraphNode {
        id: agent_node_id.clone(),
        kind: GraphNodeKind::Agent,
        label: agent_id.to_string(),
        attributes: BTreeMap::new(),
    });

    for event in events {
        let session_node_id = format!("session:{}", event.session_id);
        if seen_sessions.insert(event.session_id) {
            nodes.push(GraphNode {
                id: session_node_id.clone(),
                kind: GraphNodeKind::Session,
                label: event.session_id.to_string(),
                attributes: BTreeMap::new(),
            });
            edges.push(GraphEdge {
                source: agent_node_id.clone(),
                target: session_node_id.clone(),
                kind: GraphEdgeKind::HadSession,
                decision: None,
                risk_score: None,
            });
        }

        let tool_node_id = format!("tool:{}", event.action.tool_name);
        if seen_tools.insert(event.action.tool_name.clone()) {
            nodes.push(GraphNode {
                id: tool_node_id.clone(),
                kind: GraphNodeKind::Tool,
                label: event.action.tool_name.clone(),
                attributes: BTreeMap::new(),
            });
        }

        let session_tool_key = (event.session_id, event.action.tool_name.clone());
        if seen_session_tool_edges.insert(session_tool_key) {
            edges.push(GraphEdge {
                source: session_node_id,
                target: tool_node_id.clone(),
                kind: GraphEdgeKind::UsedTool,
                decision: Some(event.decision),
                risk_score: Some(event.assessment.risk_score()),
            });
        }

        for indicator in &event.assessment.indicators {
            let indicator_node_id = format!("indicator:{indicator}");
            if seen_indicators.insert(indicator.clone()) {
                nodes.push(GraphNode {
                    id: indicator_node_id.clone(),
                    kind: GraphNodeKind::Indicator,
                    label: indicator.clone(),
                    attributes: BTreeMap::new(),
                });
            }
            let tool_indicator_key = (event.action.tool_name.clone(), indicator.clone());
            if seen_tool_indicator_edges.insert(tool_indicator_key) {
                edges.push(GraphEdge {
                    source: tool_node_id.clone(),
                    target: indicator_node_id,
                    kind: GraphEdgeKind::ExhibitedPattern,
                    decision: None,
                    risk_score: None,
                });
            }
        }
    }

    AgentGraphData { nodes, edges }
}
