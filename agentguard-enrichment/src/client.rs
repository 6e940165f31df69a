//! The `EnrichmentClient` contract and its reference LLM-backed implementation.

use crate::prompts::{build_triage_prompt, enrichment_tool, ENRICH_TOOL_NAME, SYSTEM_PROMPT};
use agentguard_analyzer::{AnthropicClient, Message, MessageRequest, ToolChoice};
use agentguard_core::{
    AnalyzerError, AttackPattern, EnrichmentInsight, Event, InsightId, Severity,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Contract consumed by the enrichment worker. Implementations must be
/// non-blocking and bounded by their own configured timeout; the single
/// load-bearing invariant is that `enrich` **never raises** — any failure
/// degrades to [`EnrichmentInsight::fallback`] instead.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn enrich(&self, event: &Event) -> EnrichmentInsight;
}

/// Reference implementation: a forced-tool-use call against the Anthropic
/// Messages API, bounded by an explicit deadline around the HTTP call.
pub struct AnthropicEnrichmentClient {
    client: AnthropicClient,
    model: String,
    timeout: Duration,
}

impl AnthropicEnrichmentClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self { client: AnthropicClient::new(api_key, 50), model: model.into(), timeout }
    }

    /// Construct from the environment (`ANTHROPIC_API_KEY`,
    /// `AGENTGUARD_ANALYZER_MODEL`, `AGENTGUARD_ENRICHMENT_TIMEOUT`), or
    /// `None` if no API key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        let model = std::env::var("AGENTGUARD_ANALYZER_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-6".to_string());
        let timeout_secs: f64 = std::env::var("AGENTGUARD_ENRICHMENT_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30.0);
        Some(Self::new(api_key, model, Duration::from_secs_f64(timeout_secs)))
    }

    async fn enrich_fallible(&self, event: &Event) -> Result<EnrichmentInsight, AnalyzerError> {
        let request = MessageRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: build_triage_prompt(event),
            }],
            max_tokens: 1024,
            system: Some(SYSTEM_PROMPT.to_string()),
            temperature: Some(0.0),
            tools: Some(vec![enrichment_tool()]),
            tool_choice: Some(ToolChoice::Tool { name: ENRICH_TOOL_NAME.to_string() }),
        };

        let response = self.client.send(request, self.timeout).await?;
        let input = response.tool_input(ENRICH_TOOL_NAME).ok_or(AnalyzerError::NoToolResult)?;

        let attack_pattern = match input.get("attack_pattern").and_then(|v| v.as_str()) {
            Some("credential_exfiltration") => AttackPattern::CredentialExfiltration,
            Some("data_exfiltration") => AttackPattern::DataExfiltration,
            Some("prompt_injection") => AttackPattern::PromptInjection,
            Some("goal_hijacking") => AttackPattern::GoalHijacking,
            Some("memory_poisoning") => AttackPattern::MemoryPoisoning,
            Some("privilege_escalation") => AttackPattern::PrivilegeEscalation,
            Some("lateral_movement") => AttackPattern::LateralMovement,
            Some("reconnaissance") => AttackPattern::Reconnaissance,
            _ => AttackPattern::None,
        };
        let severity = match input.get("severity").and_then(|v| v.as_str()) {
            Some("medium") => Severity::Medium,
            Some("high") => Severity::High,
            Some("critical") => Severity::Critical,
            _ => Severity::Low,
        };
        let confidence = input.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let false_positive_likelihood =
            input.get("false_positive_likelihood").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let summary = input
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("no summary given")
            .to_string();
        let recommended_action = input
            .get("recommended_action")
            .and_then(|v| v.as_str())
            .unwrap_or("Review manually")
            .to_string();

        Ok(EnrichmentInsight {
            insight_id: InsightId::now_v7(),
            event_id: event.event_id,
            attack_pattern,
            confidence,
            severity,
            summary,
            recommended_action,
            false_positive_likelihood,
            created_at: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl EnrichmentClient for AnthropicEnrichmentClient {
    async fn enrich(&self, event: &Event) -> EnrichmentInsight {
        match self.enrich_fallible(event).await {
            Ok(insight) => insight,
            Err(err) => {
                warn!(error = %err, "enrichment_classification_failed");
                EnrichmentInsight::fallback(event.event_id)
            }
        }
    }
}

/// Client used whenever no enrichment credential is configured. Always
/// returns the fallback insight; never performs I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackEnrichmentClient;

#[async_trait]
impl EnrichmentClient for FallbackEnrichmentClient {
    async fn enrich(&self, event: &Event) -> EnrichmentInsight {
        EnrichmentInsight::fallback(event.event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentguard_core::{
        Action, ActionId, ActionType, AgentId, Decision, EventId, RiskAssessment, SessionId,
    };
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn event() -> Event {
        Event {
            event_id: EventId::now_v7(),
            session_id: SessionId::now_v7(),
            agent_id: AgentId::now_v7(),
            agent_is_registered: true,
            agent_goal: "test".to_string(),
            action: Action {
                action_id: ActionId::now_v7(),
                action_type: ActionType::ShellCommand,
                tool_name: "bash".to_string(),
                parameters: BTreeMap::new(),
                raw_payload: serde_json::Value::Null,
                timestamp: chrono::Utc::now(),
            },
            assessment: RiskAssessment::new(0.9, "r", vec!["x".to_string()], false, "m", 1.0)
                .unwrap(),
            decision: Decision::Block,
            policy_violation: None,
            timestamp: chrono::Utc::now(),
            provenance: BTreeMap::new(),
            framework: "generic".to_string(),
        }
    }

    #[tokio::test]
    async fn fallback_client_matches_contract() {
        let client = FallbackEnrichmentClient;
        let insight = client.enrich(&event()).await;
        assert_eq!(insight.attack_pattern, AttackPattern::None);
        assert_eq!(insight.confidence, 0.0);
        assert_eq!(insight.severity, Severity::Low);
    }

    #[tokio::test]
    async fn anthropic_client_falls_back_on_transport_failure() {
        let client = AnthropicEnrichmentClient {
            client: AnthropicClient::new("test-key", 1000).with_base_url("http://127.0.0.1:1"),
            model: "claude-sonnet-4-6".to_string(),
            timeout: Duration::from_millis(200),
        };
        let e = event();
        let insight = client.enrich(&e).await;
        assert_eq!(insight.event_id, e.event_id);
        assert_eq!(insight.attack_pattern, AttackPattern::None);
    }
}
