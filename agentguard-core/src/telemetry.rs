//! Structured logging bindings.
//!
//! This module does not configure logging implicitly — embedding
//! applications are expected to wire their own `tracing` subscriber. It
//! ships [`init_tracing`] purely as a convenience for binaries that embed
//! AgentGuard standalone (the reference analyzer demo, integration tests),
//! driven by the same env vars the rest of the crate reads.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Read `AGENTGUARD_LOG_LEVEL` (default `INFO`).
pub fn log_level_from_env() -> String {
    std::env::var("AGENTGUARD_LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string())
}

/// Read `AGENTGUARD_JSON_LOGS` (default `false`).
pub fn json_logs_from_env() -> bool {
    std::env::var("AGENTGUARD_JSON_LOGS")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Install a process-wide `tracing` subscriber.
///
/// `level` is a standard `tracing` filter directive (e.g. `"info"`,
/// `"agentguard_interceptor=debug,info"`). When `json` is true, events are
/// emitted as newline-delimited JSON; otherwise a human-readable format is
/// used. Returns an error if a global subscriber is already installed —
/// callers should only invoke this once, at process startup.
pub fn init_tracing(level: &str, json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    }
}

/// Install a subscriber driven entirely by `AGENTGUARD_LOG_LEVEL` /
/// `AGENTGUARD_JSON_LOGS`.
pub fn init_tracing_from_env() -> Result<(), tracing_subscriber::util::TryInitError> {
    init_tracing(&log_level_from_env(), json_logs_from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_logs_parses_truthy_values() {
        std::env::remove_var("AGENTGUARD_JSON_LOGS");
        assert!(!json_logs_from_env());
        std::env::set_var("AGENTGUARD_JSON_LOGS", "true");
        assert!(json_logs_from_env());
        std::env::set_var("AGENTGUARD_JSON_LOGS", "0");
        assert!(!json_logs_from_env());
        std::env::remove_var("AGENTGUARD_JSON_LOGS");
    }

    #[test]
    fn log_level_defaults_to_info() {
        std::env::remove_var("AGENTGUARD_LOG_LEVEL");
        assert_eq!(log_level_from_env(), "INFO");
    }
}
