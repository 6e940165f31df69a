//! `Guard`: the one-call facade that wires a [`PolicyEngine`], a
//! [`RiskClassifier`], an [`EventLedger`], and the optional stream/enrichment
//! side channels from environment variables (§2.1, §6, §9).
//!
//! Library code never reaches into the environment on its own behalf except
//! through this facade — every other type in the workspace takes its
//! collaborators as explicit constructor arguments.

use crate::interceptor::{InterceptRequest, Interceptor};
use agentguard_analyzer::{AnthropicRiskClassifier, FallbackClassifier, RiskClassifier};
use agentguard_core::{Decision, Event, GuardResult};
use agentguard_enrichment::{AnthropicEnrichmentClient, EnrichmentClient, FallbackEnrichmentClient, InsightStore};
use agentguard_ledger::EventLedger;
use agentguard_ledger::InMemoryEventLedger;
use agentguard_policy::PolicyEngine;
use agentguard_stream::RedisStreamPublisher;
use std::sync::Arc;
use tracing::info;

const DEFAULT_POLICY_PATH: &str = "policies/default.yaml";

/// Façade wrapping one wired [`Interceptor`]. Construct with [`Guard::from_env`]
/// for the standard deployment shape, or [`Guard::new`] to supply every
/// collaborator explicitly (tests, embedding apps with their own wiring).
#[derive(Clone)]
pub struct Guard {
    interceptor: Interceptor,
}

impl Guard {
    pub fn new(
        policy: Arc<PolicyEngine>,
        classifier: Arc<dyn RiskClassifier>,
        ledger: Arc<dyn EventLedger>,
        stream: Option<Arc<RedisStreamPublisher>>,
        enrichment: Arc<dyn EnrichmentClient>,
        insight_store: Arc<InsightStore>,
    ) -> Self {
        Self {
            interceptor: Interceptor::new(policy, classifier, ledger, stream, enrichment, insight_store),
        }
    }

    /// Wire every collaborator from the environment (§6):
    ///
    /// - policy from `AGENTGUARD_POLICY_PATH` (default `policies/default.yaml`)
    /// - the Anthropic classifier if `ANTHROPIC_API_KEY` is set, else [`FallbackClassifier`]
    /// - an in-process, ephemeral [`InMemoryEventLedger`] (see [`Guard::from_env_with_ledger`]
    ///   for a durable backend such as Postgres)
    /// - [`RedisStreamPublisher::from_env`] (naturally disabled without `REDIS_URL`)
    /// - the Anthropic enrichment client if `ANTHROPIC_API_KEY` is set, else [`FallbackEnrichmentClient`]
    /// - [`InsightStore::from_env`]
    pub fn from_env() -> GuardResult<Self> {
        let ledger: Arc<dyn EventLedger> = Arc::new(InMemoryEventLedger::new());
        Self::from_env_with_ledger(ledger)
    }

    /// Same wiring as [`Guard::from_env`] but with an explicit ledger backend,
    /// e.g. a `PostgresEventLedger` for durable deployments.
    pub fn from_env_with_ledger(ledger: Arc<dyn EventLedger>) -> GuardResult<Self> {
        let policy_path = std::env::var("AGENTGUARD_POLICY_PATH").unwrap_or_else(|_| DEFAULT_POLICY_PATH.to_string());
        let policy = Arc::new(PolicyEngine::from_yaml(policy_path)?);

        let classifier: Arc<dyn RiskClassifier> = match AnthropicRiskClassifier::from_env() {
            Some(client) => Arc::new(client),
            None => {
                info!("anthropic_api_key_absent_using_fallback_classifier");
                Arc::new(FallbackClassifier)
            }
        };

        let enrichment: Arc<dyn EnrichmentClient> = match AnthropicEnrichmentClient::from_env() {
            Some(client) => Arc::new(client),
            None => Arc::new(FallbackEnrichmentClient),
        };

        let stream = Some(Arc::new(RedisStreamPublisher::from_env()));
        let insight_store = Arc::new(InsightStore::from_env());

        Ok(Self::new(policy, classifier, ledger, stream, enrichment, insight_store))
    }

    pub async fn intercept(&self, request: InterceptRequest) -> GuardResult<(Decision, Event)> {
        self.interceptor.intercept(request).await
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        self.interceptor.policy()
    }

    pub fn ledger(&self) -> &Arc<dyn EventLedger> {
        self.interceptor.ledger()
    }

    pub fn insight_store(&self) -> &Arc<InsightStore> {
        self.interceptor.insight_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentguard_ledger::InMemoryEventLedger;
    use agentguard_policy::PolicyConfig;

    #[test]
    fn new_wires_a_guard_without_touching_the_environment() {
        let ledger: Arc<dyn EventLedger> = Arc::new(InMemoryEventLedger::new());
        let guard = Guard::new(
            Arc::new(PolicyEngine::new(PolicyConfig::default())),
            Arc::new(FallbackClassifier),
            ledger,
            None,
            Arc::new(FallbackEnrichmentClient),
            Arc::new(InsightStore::new(10)),
        );
        assert_eq!(guard.policy().config().risk_threshold, 0.75);
    }
}
