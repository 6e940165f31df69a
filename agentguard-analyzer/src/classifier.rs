//! The `RiskClassifier` contract and its reference LLM-backed implementation.

use crate::client::AnthropicClient;
use crate::prompts::{assess_risk_tool, build_user_prompt, ASSESS_RISK_TOOL_NAME, SYSTEM_PROMPT};
use crate::types::{Message, MessageRequest, ToolChoice};
use agentguard_core::{Action, AnalyzerError, RiskAssessment};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::warn;

/// Contract consumed by the Interceptor. Implementations must be
/// non-blocking and bounded by their own configured timeout; the single
/// load-bearing invariant is that `classify` **never raises** — any
/// failure degrades to [`RiskAssessment::fallback`] instead (P5).
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    async fn classify(&self, action: &Action, agent_goal: &str) -> RiskAssessment;
}

/// Reference implementation: a forced-tool-use call against the Anthropic
/// Messages API, bounded by an explicit deadline around the HTTP call.
pub struct AnthropicRiskClassifier {
    client: AnthropicClient,
    model: String,
    timeout: Duration,
}

impl AnthropicRiskClassifier {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: AnthropicClient::new(api_key, 50),
            model: model.into(),
            timeout,
        }
    }

    /// Construct from the environment (`ANTHROPIC_API_KEY`,
    /// `AGENTGUARD_ANALYZER_MODEL`, `AGENTGUARD_ANALYZER_TIMEOUT`), or
    /// `None` if no API key is configured — callers should fall back to
    /// [`FallbackClassifier`] in that case.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        let model = std::env::var("AGENTGUARD_ANALYZER_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-6".to_string());
        let timeout_secs: f64 = std::env::var("AGENTGUARD_ANALYZER_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10.0);
        Some(Self::new(api_key, model, Duration::from_secs_f64(timeout_secs)))
    }

    async fn classify_fallible(
        &self,
        action: &Action,
        agent_goal: &str,
    ) -> Result<RiskAssessment, AnalyzerError> {
        let started = Instant::now();
        let request = MessageRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: build_user_prompt(action, agent_goal),
            }],
            max_tokens: 1024,
            system: Some(SYSTEM_PROMPT.to_string()),
            temperature: Some(0.0),
            tools: Some(vec![assess_risk_tool()]),
            tool_choice: Some(ToolChoice::Tool { name: ASSESS_RISK_TOOL_NAME.to_string() }),
        };

        let response = self.client.send(request, self.timeout).await?;
        let input = response
            .tool_input(ASSESS_RISK_TOOL_NAME)
            .ok_or(AnalyzerError::NoToolResult)?;

        let risk_score = input
            .get("risk_score")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AnalyzerError::InvalidResponse {
                reason: "missing risk_score".to_string(),
            })?;
        let reason = input
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("no reason given")
            .to_string();
        let indicators: Vec<String> = input
            .get("indicators")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let is_goal_aligned = input.get("is_goal_aligned").and_then(|v| v.as_bool()).unwrap_or(false);

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        // Deliberately not clamped: an out-of-range score from the model is
        // a malformed response, not a value to coerce (P7) — it falls
        // through to `classify`'s fallback like any other analyzer error.
        RiskAssessment::new(
            risk_score,
            reason,
            indicators,
            is_goal_aligned,
            self.model.clone(),
            latency_ms,
        )
        .map_err(|e| AnalyzerError::InvalidResponse { reason: e.to_string() })
    }
}

#[async_trait]
impl RiskClassifier for AnthropicRiskClassifier {
    async fn classify(&self, action: &Action, agent_goal: &str) -> RiskAssessment {
        match self.classify_fallible(action, agent_goal).await {
            Ok(assessment) => assessment,
            Err(err) => {
                warn!(error = %err, "analyzer_classification_failed");
                RiskAssessment::fallback(err)
            }
        }
    }
}

/// Classifier used whenever no analyzer credential is configured. Always
/// returns the fallback assessment; never performs I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackClassifier;

#[async_trait]
impl RiskClassifier for FallbackClassifier {
    async fn classify(&self, _action: &Action, _agent_goal: &str) -> RiskAssessment {
        RiskAssessment::fallback("no analyzer configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn action() -> Action {
        Action::new("bash", agentguard_core::ActionType::ShellCommand)
            .with_parameters(BTreeMap::new())
    }

    #[tokio::test]
    async fn fallback_classifier_matches_contract_p5() {
        let classifier = FallbackClassifier;
        let assessment = classifier.classify(&action(), "inspect logs").await;
        assert_eq!(assessment.risk_score(), 0.5);
        assert_eq!(assessment.analyzer_model, agentguard_core::FALLBACK_MODEL);
        assert!(assessment.reason.starts_with("analyzer_unavailable"));
        assert!(assessment.indicators.contains(&"analyzer_error".to_string()));
        assert!(!assessment.is_goal_aligned);
    }

    #[tokio::test]
    async fn anthropic_classifier_falls_back_on_transport_failure() {
        // Pointed at an address nothing listens on: every call fails
        // transport-side and must still produce the fallback contract.
        let classifier = AnthropicRiskClassifier {
            client: AnthropicClient::new("test-key", 1000).with_base_url("http://127.0.0.1:1"),
            model: "claude-sonnet-4-6".to_string(),
            timeout: Duration::from_millis(200),
        };
        let assessment = classifier.classify(&action(), "inspect logs").await;
        assert_eq!(assessment.risk_score(), 0.5);
        assert_eq!(assessment.analyzer_model, agentguard_core::FALLBACK_MODEL);
    }
}
