//! Error taxonomy for AgentGuard operations.
//!
//! Each concern gets its own enum; `GuardError` unifies them behind `#[from]`
//! so call sites can propagate with `?` regardless of which layer failed.

use crate::Event;
use thiserror::Error;

/// Policy engine errors: loading, parsing, and validating policy config.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse policy yaml: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid policy config: {reason}")]
    InvalidConfig { reason: String },

    #[error("policy rejected unknown field: {field}")]
    UnknownField { field: String },
}

/// Risk classifier errors. Constructed internally, but by contract never
/// returned from `RiskClassifier::classify` — callers always get the
/// fallback assessment instead. Retained as a type so implementations have
/// somewhere to put the failure detail they log before falling back.
#[derive(Debug, Clone, Error)]
pub enum AnalyzerError {
    #[error("analyzer request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("analyzer transport error: {reason}")]
    Transport { reason: String },

    #[error("analyzer returned no structured tool result")]
    NoToolResult,

    #[error("analyzer response failed to parse: {reason}")]
    InvalidResponse { reason: String },

    #[error("analyzer rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("analyzer credential rejected")]
    InvalidApiKey,
}

/// Event ledger errors.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger lock poisoned")]
    LockPoisoned,

    #[error("event not found: {0}")]
    NotFound(String),

    #[error("ledger backend error: {reason}")]
    Backend { reason: String },

    #[error("ledger migration failed: {reason}")]
    MigrationFailed { reason: String },
}

/// Stream transport errors (publisher and consumer).
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("stream transport not configured")]
    NotConfigured,

    #[error("stream connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("stream publish failed: {reason}")]
    PublishFailed { reason: String },

    #[error("consumer group error: {reason}")]
    ConsumerGroup { reason: String },
}

/// Configuration errors shared across crates (env var parsing, cross-field
/// invariants on hand-constructed structs).
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Carries the full event that caused a BLOCK decision, for adapters that
/// signal the block to their host agent framework as an error.
#[derive(Debug, Clone, Error)]
#[error("action blocked by AgentGuard: {}", .0.policy_violation.as_ref().map(|v| v.detail.as_str()).unwrap_or("risk threshold exceeded"))]
pub struct BlockedByAgentGuard(pub Box<Event>);

/// Master error type for AgentGuard operations.
#[derive(Debug, Clone, Error)]
pub enum GuardError {
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Blocked(#[from] BlockedByAgentGuard),
}

/// Result alias for fallible AgentGuard operations.
pub type GuardResult<T> = Result<T, GuardError>;
