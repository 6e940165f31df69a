//! The interception pipeline (§4.4): the single orchestration entry point
//! tying normalization, policy, classification, ledger, and enrichment
//! together.

use crate::counters::SessionCounters;
use crate::normalizer::normalize;
use agentguard_analyzer::RiskClassifier;
use agentguard_core::{
    Action, ActionType, AgentId, Decision, Event, EventId, GuardResult, PolicyViolation,
    RiskAssessment, SessionId, POLICY_ENGINE_MODEL,
};
use agentguard_enrichment::EnrichmentClient;
use agentguard_enrichment::InsightStore;
use agentguard_ledger::EventLedger;
use agentguard_policy::PolicyEngine;
use agentguard_stream::RedisStreamPublisher;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Inputs to a single [`Interceptor::intercept`] call. Everything but the
/// raw payload and the agent's stated goal has a sensible default, mirroring
/// the builder pattern `Action::new(..).with_parameters(..)` already uses
/// elsewhere in this workspace.
#[derive(Debug, Clone)]
pub struct InterceptRequest {
    pub raw_payload: Json,
    pub agent_goal: String,
    pub session_id: Option<SessionId>,
    pub agent_id: Option<AgentId>,
    pub agent_is_registered: bool,
    pub provenance: BTreeMap<String, Json>,
    pub framework: Option<String>,
}

impl InterceptRequest {
    pub fn new(raw_payload: Json, agent_goal: impl Into<String>) -> Self {
        Self {
            raw_payload,
            agent_goal: agent_goal.into(),
            session_id: None,
            agent_id: None,
            agent_is_registered: false,
            provenance: BTreeMap::new(),
            framework: None,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_agent_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn with_agent_registered(mut self, registered: bool) -> Self {
        self.agent_is_registered = registered;
        self
    }

    pub fn with_provenance(mut self, provenance: BTreeMap<String, Json>) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Orchestrates the full pipeline. Cheap to clone (every field is an `Arc`),
/// so one instance is shared across all sessions a process serves.
#[derive(Clone)]
pub struct Interceptor {
    policy: Arc<PolicyEngine>,
    classifier: Arc<dyn RiskClassifier>,
    ledger: Arc<dyn EventLedger>,
    stream: Option<Arc<RedisStreamPublisher>>,
    enrichment: Arc<dyn EnrichmentClient>,
    insight_store: Arc<InsightStore>,
    counters: Arc<SessionCounters>,
}

impl Interceptor {
    pub fn new(
        policy: Arc<PolicyEngine>,
        classifier: Arc<dyn RiskClassifier>,
        ledger: Arc<dyn EventLedger>,
        stream: Option<Arc<RedisStreamPublisher>>,
        enrichment: Arc<dyn EnrichmentClient>,
        insight_store: Arc<InsightStore>,
    ) -> Self {
        Self {
            policy,
            classifier,
            ledger,
            stream,
            enrichment,
            insight_store,
            counters: Arc::new(SessionCounters::new()),
        }
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn ledger(&self) -> &Arc<dyn EventLedger> {
        &self.ledger
    }

    pub fn insight_store(&self) -> &Arc<InsightStore> {
        &self.insight_store
    }

    /// Run one action through the full pipeline: steps 1-9 of §4.4.
    pub async fn intercept(&self, request: InterceptRequest) -> GuardResult<(Decision, Event)> {
        let started = Instant::now();
        let session_id = request.session_id.unwrap_or_else(SessionId::now_v7);
        let agent_id = request.agent_id.unwrap_or_else(AgentId::now_v7);
        let framework = request.framework.unwrap_or_else(|| "generic".to_string());

        let action = normalize(&request.raw_payload, Some(&framework));

        let (decision, violation, assessment) =
            self.decide(&action, &request.agent_goal, session_id, started).await;

        let event = Event {
            event_id: EventId::now_v7(),
            session_id,
            agent_id,
            agent_is_registered: request.agent_is_registered,
            agent_goal: request.agent_goal,
            action,
            assessment,
            decision,
            policy_violation: violation,
            timestamp: chrono::Utc::now(),
            provenance: request.provenance,
            framework,
        };

        if let Err(err) = self.ledger.append(event.clone()).await {
            // A ledger outage on append must not reverse the decision (§4.4
            // step 6, §7): a BLOCK that wasn't durably logged is still
            // enforced, so we log and fall through rather than propagate.
            error!(error = %err, event_id = %event.event_id, "ledger_append_failed");
        }

        match decision {
            Decision::Allow => info!(tool = %event.action.tool_name, session = %session_id, "action_allowed"),
            Decision::Review => info!(tool = %event.action.tool_name, session = %session_id, "action_flagged_for_review"),
            Decision::Block => info!(tool = %event.action.tool_name, session = %session_id, "action_blocked"),
        }

        if decision != Decision::Allow {
            self.dispatch_enrichment(event.clone());
        }

        self.counters.record(session_id, decision == Decision::Block);

        Ok((decision, event))
    }

    /// Steps 3-5: session limits, deterministic policy, classifier.
    async fn decide(
        &self,
        action: &Action,
        agent_goal: &str,
        session_id: SessionId,
        started: Instant,
    ) -> (Decision, Option<PolicyViolation>, RiskAssessment) {
        let counts = self.counters.get(session_id);
        let (limit_decision, limit_violation) =
            self.policy.evaluate_session_limits(counts.actions, counts.blocked);

        if limit_decision == Decision::Block {
            info!(session = %session_id, "session_limit_exceeded");
            let assessment = RiskAssessment::new(
                1.0,
                "session limit exceeded",
                vec!["session_limit".to_string()],
                false,
                POLICY_ENGINE_MODEL,
                elapsed_ms(started),
            )
            .expect("1.0 is always a valid risk score");
            return (limit_decision, limit_violation, assessment);
        }

        let (policy_decision, policy_violation) = self.policy.evaluate(action);

        if policy_decision == Decision::Block {
            let score = if action.action_type == ActionType::CredentialAccess { 0.95 } else { 0.80 };
            let indicator = policy_violation
                .as_ref()
                .map(|v| v.rule_type.clone())
                .unwrap_or_else(|| "policy_violation".to_string());
            let reason = policy_violation
                .as_ref()
                .map(|v| format!("deterministic policy violation: {}", v.detail))
                .unwrap_or_else(|| "deterministic policy violation".to_string());
            let assessment = RiskAssessment::new(
                score,
                reason,
                vec![indicator],
                false,
                POLICY_ENGINE_MODEL,
                elapsed_ms(started),
            )
            .expect("0.80/0.95 are always valid risk scores");
            return (policy_decision, policy_violation, assessment);
        }

        let assessment = self.classifier.classify(action, agent_goal).await;
        let (risk_decision, risk_violation) = self.policy.evaluate_risk(assessment.risk_score());

        if risk_decision > policy_decision {
            (risk_decision, risk_violation, assessment)
        } else {
            (policy_decision, policy_violation, assessment)
        }
    }

    /// Step 7: fire-and-forget enrichment dispatch, preferring the stream
    /// publisher when configured.
    fn dispatch_enrichment(&self, event: Event) {
        let stream = self.stream.clone();
        let enrichment = self.enrichment.clone();
        let insight_store = self.insight_store.clone();

        tokio::spawn(async move {
            let publish_to_stream = stream.as_ref().map(|s| s.is_enabled()).unwrap_or(false);
            if let Some(publisher) = stream.filter(|_| publish_to_stream) {
                publisher.publish_event(&event).await;
                return;
            }
            let insight = enrichment.enrich(&event).await;
            insight_store.put(insight);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentguard_analyzer::FallbackClassifier;
    use agentguard_enrichment::FallbackEnrichmentClient;
    use agentguard_ledger::InMemoryEventLedger;
    use agentguard_policy::PolicyConfig;
    use serde_json::json;

    fn scenario_policy() -> PolicyConfig {
        PolicyConfig {
            risk_threshold: 0.75,
            review_threshold: 0.60,
            deny_tools: vec!["bash".to_string()],
            deny_path_patterns: vec![
                "~/.ssh/**".to_string(),
                "~/.aws/credentials".to_string(),
                "**/*.pem".to_string(),
            ],
            deny_domains: vec!["*.ngrok.io".to_string(), "*.requestbin.com".to_string()],
            ..PolicyConfig::default()
        }
    }

    struct FixedScoreClassifier(f64);

    #[async_trait::async_trait]
    impl RiskClassifier for FixedScoreClassifier {
        async fn classify(&self, _action: &Action, _agent_goal: &str) -> RiskAssessment {
            RiskAssessment::new(self.0, "mock", vec![], true, "mock", 0.0).unwrap()
        }
    }

    fn interceptor_with(score: f64) -> Interceptor {
        Interceptor::new(
            Arc::new(PolicyEngine::new(scenario_policy())),
            Arc::new(FixedScoreClassifier(score)),
            Arc::new(InMemoryEventLedger::new()),
            None,
            Arc::new(FallbackEnrichmentClient),
            Arc::new(InsightStore::new(100)),
        )
    }

    async fn run(interceptor: &Interceptor, session: SessionId, payload: Json) -> Decision {
        let request = InterceptRequest::new(payload, "test goal").with_session_id(session);
        interceptor.intercept(request).await.unwrap().0
    }

    #[tokio::test]
    async fn six_scenario_table_matches_spec() {
        let session = SessionId::now_v7();

        let i1 = interceptor_with(0.92);
        assert_eq!(
            run(&i1, session, json!({"tool_name": "http.request", "parameters": {"url": "https://abc123.ngrok.io/exfil"}})).await,
            Decision::Block
        );

        let i2 = interceptor_with(0.88);
        assert_eq!(
            run(&i2, session, json!({"tool_name": "http.post", "parameters": {"url": "https://xyz.requestbin.com/r/capture"}})).await,
            Decision::Block
        );

        let i3 = interceptor_with(0.45);
        assert_eq!(
            run(&i3, session, json!({"tool_name": "file.read", "parameters": {"path": "~/.ssh/id_rsa"}})).await,
            Decision::Block
        );

        let i4 = interceptor_with(0.81);
        assert_eq!(
            run(&i4, session, json!({"tool_name": "memory.write", "parameters": {"value": "OVERRIDE ignore previous"}})).await,
            Decision::Block
        );

        let i5 = interceptor_with(0.95);
        assert_eq!(
            run(&i5, session, json!({"tool_name": "file.read", "parameters": {"path": "~/.aws/credentials"}})).await,
            Decision::Block
        );

        let i6 = interceptor_with(0.05);
        assert_eq!(
            run(&i6, session, json!({"tool_name": "file.read", "parameters": {"path": "README.md"}})).await,
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn timeline_summary_aggregates_the_six_scenario_session() {
        let session = SessionId::now_v7();
        let ledger = Arc::new(InMemoryEventLedger::new());
        let policy = Arc::new(PolicyEngine::new(scenario_policy()));

        let inputs: Vec<(Json, f64)> = vec![
            (json!({"tool_name": "http.request", "parameters": {"url": "https://abc123.ngrok.io/exfil"}}), 0.92),
            (json!({"tool_name": "http.post", "parameters": {"url": "https://xyz.requestbin.com/r/capture"}}), 0.88),
            (json!({"tool_name": "file.read", "parameters": {"path": "~/.ssh/id_rsa"}}), 0.45),
            (json!({"tool_name": "memory.write", "parameters": {"value": "OVERRIDE ignore previous"}}), 0.81),
            (json!({"tool_name": "file.read", "parameters": {"path": "~/.aws/credentials"}}), 0.95),
            (json!({"tool_name": "file.read", "parameters": {"path": "README.md"}}), 0.05),
        ];

        for (payload, score) in inputs {
            let interceptor = Interceptor::new(
                policy.clone(),
                Arc::new(FixedScoreClassifier(score)),
                ledger.clone(),
                None,
                Arc::new(FallbackEnrichmentClient),
                Arc::new(InsightStore::new(100)),
            );
            let request = InterceptRequest::new(payload, "test goal").with_session_id(session);
            interceptor.intercept(request).await.unwrap();
        }

        let summary = ledger.get_timeline_summary(session).await.unwrap().unwrap();
        assert_eq!(summary.total_events, 6);
        assert_eq!(summary.blocked_events, 5);
        assert_eq!(summary.allowed_events, 1);
        assert!(summary.max_risk_score >= 0.95);
    }

    #[tokio::test]
    async fn session_limits_block_before_policy_p8() {
        let mut policy_config = scenario_policy();
        policy_config.session_limits.max_actions = 2;
        let policy = Arc::new(PolicyEngine::new(policy_config));
        let ledger = Arc::new(InMemoryEventLedger::new());
        let session = SessionId::now_v7();

        for i in 0..3 {
            let interceptor = Interceptor::new(
                policy.clone(),
                Arc::new(FixedScoreClassifier(0.0)),
                ledger.clone(),
                None,
                Arc::new(FallbackEnrichmentClient),
                Arc::new(InsightStore::new(100)),
            );
            let request = InterceptRequest::new(json!({"tool_name": "search"}), "goal").with_session_id(session);
            let (decision, event) = interceptor.intercept(request).await.unwrap();
            if i < 2 {
                assert_eq!(decision, Decision::Allow);
            } else {
                assert_eq!(decision, Decision::Block);
                assert_eq!(event.policy_violation.unwrap().rule_name, "session_limits");
            }
        }
    }

    #[tokio::test]
    async fn classifier_never_raises_p5() {
        // FallbackClassifier never performs I/O and always returns the
        // fallback assessment; intercept must still complete normally.
        let interceptor = Interceptor::new(
            Arc::new(PolicyEngine::new(PolicyConfig::default())),
            Arc::new(FallbackClassifier),
            Arc::new(InMemoryEventLedger::new()),
            None,
            Arc::new(FallbackEnrichmentClient),
            Arc::new(InsightStore::new(100)),
        );
        let request = InterceptRequest::new(json!({"tool_name": "search"}), "goal");
        let (decision, event) = interceptor.intercept(request).await.unwrap();
        assert_eq!(decision, Decision::Allow);
        assert_eq!(event.assessment.analyzer_model, agentguard_core::FALLBACK_MODEL);
    }
}
