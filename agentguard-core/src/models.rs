//! Shared data model: actions, assessments, events, and aggregation types.
//!
//! These types are intentionally dumb — construction and derived properties
//! only. Business logic (normalization, policy, classification) lives in
//! their respective crates and takes these types as input/output.

use crate::{ActionId, AgentId, EventId, InsightId, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of tool invocation a raw payload normalizes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ToolCall,
    ShellCommand,
    FileRead,
    FileWrite,
    HttpRequest,
    MemoryWrite,
    CredentialAccess,
    Unknown,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ToolCall => "tool_call",
            Self::ShellCommand => "shell_command",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::HttpRequest => "http_request",
            Self::MemoryWrite => "memory_write",
            Self::CredentialAccess => "credential_access",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl ActionType {
    /// True for the two variants the policy engine treats as file I/O for
    /// `deny_path_patterns` purposes.
    pub fn is_file_op(self) -> bool {
        matches!(self, Self::FileRead | Self::FileWrite | Self::CredentialAccess)
    }
}

/// The guard's verdict on an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    // Ordering matters: `Decision` derives `Ord` so `evaluate_risk`
    // monotonicity (P3) can be asserted with plain `<=` comparisons.
    Allow,
    Review,
    Block,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::Review => "review",
            Self::Block => "block",
        };
        f.write_str(s)
    }
}

/// A single normalised tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: ActionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub tool_name: String,
    pub parameters: BTreeMap<String, Json>,
    /// Verbatim copy of whatever was normalized, kept for forensics.
    pub raw_payload: Json,
    pub timestamp: Timestamp,
}

impl Action {
    pub fn new(tool_name: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            action_id: ActionId::now_v7(),
            action_type,
            tool_name: tool_name.into(),
            parameters: BTreeMap::new(),
            raw_payload: Json::Null,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, Json>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_raw_payload(mut self, raw_payload: Json) -> Self {
        self.raw_payload = raw_payload;
        self
    }
}

/// Risk level derived from a [`RiskAssessment::risk_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Error constructing a [`RiskAssessment`] with an out-of-range score (P7).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutOfRange(pub f64);

impl fmt::Display for ScoreOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "risk score {} is outside the closed interval [0, 1]", self.0)
    }
}

impl std::error::Error for ScoreOutOfRange {}

/// A classifier's (or the policy engine's, or the fallback's) opinion of how
/// risky an action is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    risk_score: f64,
    pub reason: String,
    pub indicators: Vec<String>,
    pub is_goal_aligned: bool,
    pub analyzer_model: String,
    pub latency_ms: f64,
}

/// Model name recorded on a fallback assessment (§4.3).
pub const FALLBACK_MODEL: &str = "fallback";
/// Model name recorded on assessments synthesised by the policy engine fast path.
pub const POLICY_ENGINE_MODEL: &str = "policy_engine";

impl RiskAssessment {
    /// Construct a `RiskAssessment`. Fails (P7) if `risk_score` is outside `[0, 1]`.
    pub fn new(
        risk_score: f64,
        reason: impl Into<String>,
        indicators: Vec<String>,
        is_goal_aligned: bool,
        analyzer_model: impl Into<String>,
        latency_ms: f64,
    ) -> Result<Self, ScoreOutOfRange> {
        if !(0.0..=1.0).contains(&risk_score) {
            return Err(ScoreOutOfRange(risk_score));
        }
        Ok(Self {
            risk_score,
            reason: reason.into(),
            indicators,
            is_goal_aligned,
            analyzer_model: analyzer_model.into(),
            latency_ms,
        })
    }

    /// The fallback assessment mandated by §4.3 when a classifier fails for
    /// any reason. This constructor cannot fail — 0.5 is always in range.
    pub fn fallback(reason_detail: impl fmt::Display) -> Self {
        Self {
            risk_score: 0.5,
            reason: format!("analyzer_unavailable: {reason_detail}"),
            indicators: vec!["analyzer_error".to_string()],
            is_goal_aligned: false,
            analyzer_model: FALLBACK_MODEL.to_string(),
            latency_ms: 0.0,
        }
    }

    pub fn risk_score(&self) -> f64 {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        if self.risk_score < 0.3 {
            RiskLevel::Low
        } else if self.risk_score < 0.6 {
            RiskLevel::Medium
        } else if self.risk_score < 0.75 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// A deterministic-rule firing that forces a BLOCK or REVIEW decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule_name: String,
    pub rule_type: String,
    pub detail: String,
    pub decision: Decision,
}

impl PolicyViolation {
    pub fn new(
        rule_name: impl Into<String>,
        rule_type: impl Into<String>,
        detail: impl Into<String>,
        decision: Decision,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            rule_type: rule_type.into(),
            detail: detail.into(),
            decision,
        }
    }
}

/// A single, immutable forensic record: one action, its assessment, and the
/// decision it produced. Never mutated after `EventLedger::append`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub agent_is_registered: bool,
    pub agent_goal: String,
    pub action: Action,
    pub assessment: RiskAssessment,
    pub decision: Decision,
    pub policy_violation: Option<PolicyViolation>,
    pub timestamp: Timestamp,
    pub provenance: BTreeMap<String, Json>,
    pub framework: String,
}

/// Aggregated per-session counters and risk stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub session_id: SessionId,
    pub total_events: u64,
    pub blocked_events: u64,
    pub reviewed_events: u64,
    pub allowed_events: u64,
    pub max_risk_score: f64,
    pub avg_risk_score: f64,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub attack_vectors: Vec<String>,
}

/// Process-wide ledger statistics (`EventLedger::get_stats`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_events: u64,
    pub blocked_events: u64,
    pub reviewed_events: u64,
    pub allowed_events: u64,
    pub active_sessions: u64,
    pub avg_risk_score: f64,
}

/// Per-agent roll-up across all sessions the ledger has seen for that agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub agent_goal: String,
    pub is_registered: bool,
    pub framework: String,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub total_sessions: u64,
    pub total_events: u64,
    pub blocked_events: u64,
    pub reviewed_events: u64,
    pub allowed_events: u64,
    pub avg_risk_score: f64,
    pub max_risk_score: f64,
    /// Indicators observed across this agent's events, most-recent-first,
    /// capped to a top-N window by the ledger that produced this profile.
    pub attack_patterns: Vec<String>,
    /// Tool names most recently used by this agent, most-recent-first.
    pub tools_used: Vec<String>,
    /// Trailing window of risk scores, oldest to newest.
    pub risk_trend: Vec<f64>,
}

/// Kind of node in a derived [`AgentGraphData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNodeKind {
    Agent,
    Session,
    Tool,
    Indicator,
}

/// A node in the derived agent-activity graph (§4.5, `get_agent_graph`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: GraphNodeKind,
    pub label: String,
    /// Kind-specific fields: agent goal/registration/rollup, session
    /// timestamp, tool's last-seen decision, etc. Kept as an open map since
    /// the shape varies by `kind` and the graph is a rendering aid, not a
    /// contract other components parse back.
    pub attributes: BTreeMap<String, Json>,
}

/// Kind of edge in a derived [`AgentGraphData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEdgeKind {
    HadSession,
    UsedTool,
    ExhibitedPattern,
}

/// An edge in the derived agent-activity graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: GraphEdgeKind,
    /// Populated for `UsedTool` edges only: the decision and risk score of
    /// the event that produced this edge.
    pub decision: Option<Decision>,
    pub risk_score: Option<f64>,
}

/// Derived agent-activity graph: never persisted, always recomputed from
/// the ledger's events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentGraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Closed enumeration of attack patterns an enrichment insight can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackPattern {
    CredentialExfiltration,
    DataExfiltration,
    PromptInjection,
    GoalHijacking,
    MemoryPoisoning,
    PrivilegeEscalation,
    LateralMovement,
    Reconnaissance,
    None,
}

impl fmt::Display for AttackPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CredentialExfiltration => "credential_exfiltration",
            Self::DataExfiltration => "data_exfiltration",
            Self::PromptInjection => "prompt_injection",
            Self::GoalHijacking => "goal_hijacking",
            Self::MemoryPoisoning => "memory_poisoning",
            Self::PrivilegeEscalation => "privilege_escalation",
            Self::LateralMovement => "lateral_movement",
            Self::Reconnaissance => "reconnaissance",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Severity of an [`EnrichmentInsight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Deep post-hoc classification of a BLOCK/REVIEW event, produced out of
/// band by the enrichment client and cached in the insight store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentInsight {
    pub insight_id: InsightId,
    pub event_id: EventId,
    pub attack_pattern: AttackPattern,
    pub confidence: f64,
    pub severity: Severity,
    pub summary: String,
    pub recommended_action: String,
    pub false_positive_likelihood: f64,
    pub created_at: Timestamp,
}

impl EnrichmentInsight {
    /// The fallback insight returned when the enrichment client is not
    /// configured (§4.7).
    pub fn fallback(event_id: EventId) -> Self {
        Self {
            insight_id: InsightId::now_v7(),
            event_id,
            attack_pattern: AttackPattern::None,
            confidence: 0.0,
            severity: Severity::Low,
            summary: "Enrichment client not configured".to_string(),
            recommended_action: "Review manually".to_string(),
            false_positive_likelihood: 0.0,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_assessment_rejects_out_of_range_scores() {
        assert!(RiskAssessment::new(-0.01, "x", vec![], true, "m", 0.0).is_err());
        assert!(RiskAssessment::new(1.01, "x", vec![], true, "m", 0.0).is_err());
        assert!(RiskAssessment::new(0.0, "x", vec![], true, "m", 0.0).is_ok());
        assert!(RiskAssessment::new(1.0, "x", vec![], true, "m", 0.0).is_ok());
    }

    #[test]
    fn risk_level_bucketing() {
        let at = |s: f64| RiskAssessment::new(s, "x", vec![], true, "m", 0.0).unwrap().risk_level();
        assert_eq!(at(0.0), RiskLevel::Low);
        assert_eq!(at(0.29), RiskLevel::Low);
        assert_eq!(at(0.3), RiskLevel::Medium);
        assert_eq!(at(0.59), RiskLevel::Medium);
        assert_eq!(at(0.6), RiskLevel::High);
        assert_eq!(at(0.74), RiskLevel::High);
        assert_eq!(at(0.75), RiskLevel::Critical);
        assert_eq!(at(1.0), RiskLevel::Critical);
    }

    #[test]
    fn fallback_assessment_matches_contract() {
        let a = RiskAssessment::fallback("timeout");
        assert_eq!(a.risk_score(), 0.5);
        assert_eq!(a.analyzer_model, FALLBACK_MODEL);
        assert!(a.indicators.contains(&"analyzer_error".to_string()));
        assert!(!a.is_goal_aligned);
        assert!(a.reason.starts_with("analyzer_unavailable"));
    }

    #[test]
    fn decision_ordering_is_allow_review_block() {
        assert!(Decision::Allow < Decision::Review);
        assert!(Decision::Review < Decision::Block);
    }
}
