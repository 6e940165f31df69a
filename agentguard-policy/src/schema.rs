//! YAML policy configuration schema (§6 "Policy file format").

use agentguard_core::{ConfigError, PolicyError};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_risk_threshold() -> f64 {
    0.75
}

fn default_review_threshold() -> f64 {
    0.60
}

fn default_max_actions() -> u64 {
    1000
}

fn default_max_blocked() -> u64 {
    50
}

/// Per-session action/block caps (§4.4 step 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionLimits {
    #[serde(default = "default_max_actions")]
    pub max_actions: u64,
    #[serde(default = "default_max_blocked")]
    pub max_blocked: u64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            max_blocked: default_max_blocked(),
        }
    }
}

/// A fully parsed and validated policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default)]
    pub deny_tools: Vec<String>,
    #[serde(default)]
    pub deny_path_patterns: Vec<String>,
    #[serde(default)]
    pub deny_domains: Vec<String>,
    #[serde(default)]
    pub review_tools: Vec<String>,
    #[serde(default)]
    pub allow_tools: Vec<String>,
    #[serde(default)]
    pub session_limits: SessionLimits,
}

fn default_name() -> String {
    "default".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            risk_threshold: default_risk_threshold(),
            review_threshold: default_review_threshold(),
            deny_tools: Vec::new(),
            deny_path_patterns: Vec::new(),
            deny_domains: Vec::new(),
            review_tools: Vec::new(),
            allow_tools: Vec::new(),
            session_limits: SessionLimits::default(),
        }
    }
}

/// A YAML document wrapping the policy fields under a `policy:` key, or a
/// raw policy document at the top level (§6).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PolicyDocument {
    Wrapped { policy: PolicyConfig },
    Bare(PolicyConfig),
}

impl PolicyConfig {
    /// Validate the cross-field invariants `risk_threshold`,
    /// `review_threshold` in `[0, 1]`, and `review_threshold < risk_threshold`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("risk_threshold", self.risk_threshold),
            ("review_threshold", self.review_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "must be within [0, 1]".to_string(),
                });
            }
        }
        if self.review_threshold >= self.risk_threshold {
            return Err(ConfigError::InvalidValue {
                field: "review_threshold".to_string(),
                value: self.review_threshold.to_string(),
                reason: format!(
                    "must be less than risk_threshold ({})",
                    self.risk_threshold
                ),
            });
        }
        Ok(())
    }

    /// Parse a policy configuration from a YAML string (top-level or
    /// nested under `policy:`), then validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument =
            serde_yaml::from_str(yaml).map_err(|e| PolicyError::ParseFailed {
                reason: e.to_string(),
            })?;
        let config = match doc {
            PolicyDocument::Wrapped { policy } => policy,
            PolicyDocument::Bare(policy) => policy,
        };
        config
            .validate()
            .map_err(|e| PolicyError::InvalidConfig { reason: e.to_string() })?;
        Ok(config)
    }

    /// Read and parse a policy configuration from a YAML file on disk.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| PolicyError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Serialise back to a bare (un-nested) YAML document.
    pub fn to_yaml(&self) -> Result<String, PolicyError> {
        serde_yaml::to_string(self).map_err(|e| PolicyError::ParseFailed { reason: e.to_string() })
    }
}
