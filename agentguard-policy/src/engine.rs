//! Deterministic policy rule evaluation (§4.2).

use crate::glob::{domain_matches, path_matches, tool_name_matches};
use crate::schema::PolicyConfig;
use agentguard_core::{
    extract_file_path, extract_url_domain, Action, ActionType, ConfigError, Decision,
    PolicyError, PolicyViolation,
};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Synchronous, in-process, hot-reloadable rule evaluator.
///
/// Configuration lives behind an `RwLock<Arc<PolicyConfig>>` so `reload`
/// swaps the whole value atomically: readers always see either the old or
/// the new configuration in full, never a partial update.
pub struct PolicyEngine {
    config: RwLock<Arc<PolicyConfig>>,
    path: Option<std::path::PathBuf>,
}

impl PolicyEngine {
    /// Build an engine from an already-validated configuration.
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            path: None,
        }
    }

    /// Load a configuration from a YAML file and remember the path for
    /// subsequent no-argument `reload()` calls.
    pub fn from_yaml(path: impl Into<std::path::PathBuf>) -> Result<Self, PolicyError> {
        let path = path.into();
        let config = PolicyConfig::from_yaml(&path)?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            path: Some(path),
        })
    }

    /// Snapshot the currently active configuration.
    pub fn config(&self) -> Arc<PolicyConfig> {
        self.config.read().expect("policy config lock poisoned").clone()
    }

    /// Re-parse the configuration file (or `path_override` if given),
    /// validate it, and swap it in atomically. On validation/parse failure
    /// the previously active configuration remains in effect.
    pub fn reload(&self, path_override: Option<&std::path::Path>) -> Result<(), PolicyError> {
        let path = path_override
            .map(|p| p.to_path_buf())
            .or_else(|| self.path.clone())
            .ok_or_else(|| PolicyError::InvalidConfig {
                reason: "no policy file path known for reload".to_string(),
            })?;
        let next = PolicyConfig::from_yaml(&path)?;
        *self.config.write().expect("policy config lock poisoned") = Arc::new(next);
        info!(path = %path.display(), "policy_reloaded");
        Ok(())
    }

    /// Replace the active configuration with an already-validated value,
    /// without touching disk. Used by embedders constructing policy
    /// programmatically rather than from a YAML file.
    pub fn set_config(&self, config: PolicyConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.config.write().expect("policy config lock poisoned") = Arc::new(config);
        Ok(())
    }

    /// Evaluate the deterministic rule set against a normalised action, in
    /// the hard-contract order from §4.2.
    pub fn evaluate(&self, action: &Action) -> (Decision, Option<PolicyViolation>) {
        let config = self.config();

        for pattern in &config.deny_tools {
            if tool_name_matches(&action.tool_name, pattern) {
                debug!(tool = %action.tool_name, pattern, "action_blocked");
                return (
                    Decision::Block,
                    Some(PolicyViolation::new(
                        "deny_tools",
                        "tool_blacklist",
                        format!("tool '{}' matches deny pattern '{pattern}'", action.tool_name),
                        Decision::Block,
                    )),
                );
            }
        }

        if !config.allow_tools.is_empty()
            && !config
                .allow_tools
                .iter()
                .any(|pattern| tool_name_matches(&action.tool_name, pattern))
        {
            return (
                Decision::Block,
                Some(PolicyViolation::new(
                    "allow_tools",
                    "tool_allowlist",
                    format!("tool '{}' is not in the allow list", action.tool_name),
                    Decision::Block,
                )),
            );
        }

        if action.action_type.is_file_op() {
            if let Some(path) = extract_file_path(&action.parameters) {
                for pattern in &config.deny_path_patterns {
                    if path_matches(&path, pattern) {
                        return (
                            Decision::Block,
                            Some(PolicyViolation::new(
                                "deny_path_patterns",
                                "path_blacklist",
                                format!("path '{path}' matches deny pattern '{pattern}'"),
                                Decision::Block,
                            )),
                        );
                    }
                }
            }
        }

        if action.action_type == ActionType::CredentialAccess {
            return (
                Decision::Block,
                Some(PolicyViolation::new(
                    "credential_access",
                    "credential_pattern",
                    "action type is credential_access".to_string(),
                    Decision::Block,
                )),
            );
        }

        if action.action_type == ActionType::HttpRequest {
            if let Some(domain) = extract_url_domain(&action.parameters) {
                for pattern in &config.deny_domains {
                    if domain_matches(&domain, pattern) {
                        return (
                            Decision::Block,
                            Some(PolicyViolation::new(
                                "deny_domains",
                                "domain_blacklist",
                                format!("domain '{domain}' matches deny pattern '{pattern}'"),
                                Decision::Block,
                            )),
                        );
                    }
                }
            }
        }

        for pattern in &config.review_tools {
            if tool_name_matches(&action.tool_name, pattern) {
                return (
                    Decision::Review,
                    Some(PolicyViolation::new(
                        "review_tools",
                        "tool_review",
                        format!("tool '{}' matches review pattern '{pattern}'", action.tool_name),
                        Decision::Review,
                    )),
                );
            }
        }

        (Decision::Allow, None)
    }

    /// Threshold comparison against a classifier (or synthesised) risk
    /// score: `score >= risk_threshold` blocks, `score >= review_threshold`
    /// flags for review, inclusive at both boundaries.
    pub fn evaluate_risk(&self, score: f64) -> (Decision, Option<PolicyViolation>) {
        let config = self.config();
        if score >= config.risk_threshold {
            return (
                Decision::Block,
                Some(PolicyViolation::new(
                    "risk_threshold",
                    "risk_score",
                    format!("risk score {score} >= threshold {}", config.risk_threshold),
                    Decision::Block,
                )),
            );
        }
        if score >= config.review_threshold {
            return (
                Decision::Review,
                Some(PolicyViolation::new(
                    "review_threshold",
                    "risk_score",
                    format!("risk score {score} >= threshold {}", config.review_threshold),
                    Decision::Review,
                )),
            );
        }
        (Decision::Allow, None)
    }

    /// Per-session action/block cap check (§4.4 step 3). Evaluated ahead of
    /// everything else by the interceptor.
    pub fn evaluate_session_limits(
        &self,
        actions: u64,
        blocked: u64,
    ) -> (Decision, Option<PolicyViolation>) {
        let config = self.config();
        let limits = &config.session_limits;
        if actions >= limits.max_actions {
            return (
                Decision::Block,
                Some(PolicyViolation::new(
                    "session_limits",
                    "session_max_actions",
                    format!("session action count {actions} >= max {}", limits.max_actions),
                    Decision::Block,
                )),
            );
        }
        if blocked >= limits.max_blocked {
            return (
                Decision::Block,
                Some(PolicyViolation::new(
                    "session_limits",
                    "session_max_blocked",
                    format!("session blocked count {blocked} >= max {}", limits.max_blocked),
                    Decision::Block,
                )),
            );
        }
        (Decision::Allow, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn engine_with(config: PolicyConfig) -> PolicyEngine {
        PolicyEngine::new(config)
    }

    fn action(tool: &str, action_type: ActionType) -> Action {
        Action::new(tool, action_type)
    }

    fn action_with_param(tool: &str, action_type: ActionType, key: &str, value: &str) -> Action {
        let mut params = BTreeMap::new();
        params.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        Action::new(tool, action_type).with_parameters(params)
    }

    #[test]
    fn deny_tools_blocks_with_exact_tag_strings() {
        let engine = engine_with(PolicyConfig {
            deny_tools: vec!["bash".to_string()],
            ..PolicyConfig::default()
        });
        let (decision, violation) = engine.evaluate(&action("bash", ActionType::ShellCommand));
        assert_eq!(decision, Decision::Block);
        let v = violation.unwrap();
        assert_eq!(v.rule_name, "deny_tools");
        assert_eq!(v.rule_type, "tool_blacklist");
    }

    #[test]
    fn credential_access_always_blocks_p2() {
        let engine = engine_with(PolicyConfig::default());
        let (decision, violation) =
            engine.evaluate(&action("anything", ActionType::CredentialAccess));
        assert_eq!(decision, Decision::Block);
        let v = violation.unwrap();
        assert_eq!(v.rule_name, "credential_access");
        assert_eq!(v.rule_type, "credential_pattern");
    }

    #[test]
    fn rule_ordering_deny_tools_precedes_credential_check() {
        // A deny-listed tool name should block via deny_tools even though
        // the action type is also credential_access — deny_tools is rule 1.
        let engine = engine_with(PolicyConfig {
            deny_tools: vec!["vault_read".to_string()],
            ..PolicyConfig::default()
        });
        let (_, violation) =
            engine.evaluate(&action("vault_read", ActionType::CredentialAccess));
        assert_eq!(violation.unwrap().rule_name, "deny_tools");
    }

    #[test]
    fn deny_path_patterns_blocks_file_actions_only() {
        let engine = engine_with(PolicyConfig {
            deny_path_patterns: vec!["~/.ssh/**".to_string()],
            ..PolicyConfig::default()
        });
        let (decision, violation) = engine.evaluate(&action_with_param(
            "read_file",
            ActionType::FileRead,
            "path",
            "~/.ssh/id_rsa",
        ));
        assert_eq!(decision, Decision::Block);
        assert_eq!(violation.unwrap().rule_type, "path_blacklist");
    }

    #[test]
    fn deny_domains_blocks_http_requests_only() {
        let engine = engine_with(PolicyConfig {
            deny_domains: vec!["*.ngrok.io".to_string()],
            ..PolicyConfig::default()
        });
        let (decision, _) = engine.evaluate(&action_with_param(
            "http_post",
            ActionType::HttpRequest,
            "url",
            "https://abc.ngrok.io/hook",
        ));
        assert_eq!(decision, Decision::Block);
    }

    #[test]
    fn allow_tools_blocks_anything_not_listed() {
        let engine = engine_with(PolicyConfig {
            allow_tools: vec!["search".to_string()],
            ..PolicyConfig::default()
        });
        let (decision, violation) =
            engine.evaluate(&action("bash", ActionType::ShellCommand));
        assert_eq!(decision, Decision::Block);
        assert_eq!(violation.unwrap().rule_name, "allow_tools");
        let (decision, _) = engine.evaluate(&action("search", ActionType::ToolCall));
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn review_tools_flags_for_review() {
        let engine = engine_with(PolicyConfig {
            review_tools: vec!["email_send".to_string()],
            ..PolicyConfig::default()
        });
        let (decision, violation) = engine.evaluate(&action("email_send", ActionType::ToolCall));
        assert_eq!(decision, Decision::Review);
        assert_eq!(violation.unwrap().rule_type, "tool_review");
    }

    #[test]
    fn deny_tools_precedes_review_tools_p4() {
        // Same tool name matches both lists; deny_tools is rule 1 and
        // review_tools is rule 6, so the block wins outright.
        let engine = engine_with(PolicyConfig {
            deny_tools: vec!["email_send".to_string()],
            review_tools: vec!["email_send".to_string()],
            ..PolicyConfig::default()
        });
        let (decision, violation) = engine.evaluate(&action("email_send", ActionType::ToolCall));
        assert_eq!(decision, Decision::Block);
        assert_eq!(violation.unwrap().rule_name, "deny_tools");
    }

    #[test]
    fn default_decision_is_allow() {
        let engine = engine_with(PolicyConfig::default());
        let (decision, violation) = engine.evaluate(&action("search", ActionType::ToolCall));
        assert_eq!(decision, Decision::Allow);
        assert!(violation.is_none());
    }

    #[test]
    fn risk_threshold_monotonicity_p3() {
        let engine = engine_with(PolicyConfig::default());
        let scores = [0.0, 0.3, 0.59, 0.6, 0.74, 0.75, 1.0];
        let mut last = Decision::Allow;
        for s in scores {
            let (d, _) = engine.evaluate_risk(s);
            assert!(d >= last, "decision regressed at score {s}");
            last = d;
        }
        assert_eq!(engine.evaluate_risk(0.75).0, Decision::Block);
        assert_eq!(engine.evaluate_risk(0.60).0, Decision::Review);
        assert_eq!(engine.evaluate_risk(0.59).0, Decision::Allow);
    }

    #[test]
    fn session_limits_precede_policy_p8() {
        let engine = engine_with(PolicyConfig::default());
        let (decision, violation) = engine.evaluate_session_limits(1000, 0);
        assert_eq!(decision, Decision::Block);
        assert_eq!(violation.as_ref().unwrap().rule_name, "session_limits");
        assert_eq!(violation.unwrap().rule_type, "session_max_actions");

        let (decision, violation) = engine.evaluate_session_limits(0, 50);
        assert_eq!(decision, Decision::Block);
        assert_eq!(violation.unwrap().rule_type, "session_max_blocked");

        assert_eq!(engine.evaluate_session_limits(999, 49).0, Decision::Allow);
    }

    #[test]
    fn reload_swaps_atomically_and_preserves_old_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "risk_threshold: 0.9\nreview_threshold: 0.1\n").unwrap();
        let engine = PolicyEngine::from_yaml(&path).unwrap();
        assert_eq!(engine.config().risk_threshold, 0.9);

        std::fs::write(&path, "risk_threshold: 0.5\nreview_threshold: 0.2\n").unwrap();
        engine.reload(None).unwrap();
        assert_eq!(engine.config().risk_threshold, 0.5);

        std::fs::write(&path, "risk_threshold: 0.1\nreview_threshold: 0.9\n").unwrap();
        assert!(engine.reload(None).is_err());
        // Invalid reload must leave the prior configuration active.
        assert_eq!(engine.config().risk_threshold, 0.5);
    }
}
