//! AgentGuard Policy - deterministic rule evaluation
//!
//! Hot-reloadable YAML-configured rule engine: tool allow/deny lists, path
//! and domain globs, session caps, and risk-score thresholds. No network
//! I/O and no classifier dependency — this crate is the fast, synchronous
//! half of the interception pipeline.

mod engine;
mod glob;
mod schema;

pub use engine::PolicyEngine;
pub use glob::{domain_matches, path_matches, tool_name_matches};
pub use schema::{PolicyConfig, SessionLimits};
