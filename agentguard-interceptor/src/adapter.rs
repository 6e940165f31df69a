//! The framework-adapter seam (§6): the common shape every concrete,
//! external framework binding implements against. Concrete adapters
//! (LangChain-style hooks, a tool-wrapper decorator, …) are out of scope
//! here — this crate only ships the trait they plug into plus the error
//! type that signals a BLOCK across that boundary.

use agentguard_core::{BlockedByAgentGuard, Decision, Event, GuardError, GuardResult};
use async_trait::async_trait;
use serde_json::Value as Json;

/// Shape a framework binding implements to hook `before_tool_call`.
///
/// A BLOCK decision is signalled by returning `Err(GuardError::Blocked(..))`
/// carrying the full `Event`; ALLOW and REVIEW both return `Ok(Event)` since
/// REVIEW does not prevent the tool from executing (it only flags the event
/// for human triage).
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Short name identifying the framework this adapter binds (recorded on
    /// every `Event::framework` it produces).
    fn framework_name(&self) -> &'static str;

    async fn before_tool_call(
        &self,
        tool_name: &str,
        parameters: Json,
        context: Option<Json>,
    ) -> GuardResult<Event>;
}

/// Convert an `intercept` result into the adapter contract: BLOCK becomes
/// `Err(BlockedByAgentGuard)`, everything else is `Ok(Event)`. Concrete
/// `AgentAdapter` implementations call this after running `Interceptor::intercept`
/// so they don't each have to re-derive the BLOCK-as-error convention.
pub fn enforce(decision: Decision, event: Event) -> GuardResult<Event> {
    if decision == Decision::Block {
        return Err(GuardError::Blocked(BlockedByAgentGuard(Box::new(event))));
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentguard_core::{
        Action, ActionId, ActionType, AgentId, RiskAssessment, SessionId,
    };
    use std::collections::BTreeMap;

    fn event(decision: Decision) -> Event {
        Event {
            event_id: agentguard_core::EventId::now_v7(),
            session_id: SessionId::now_v7(),
            agent_id: AgentId::now_v7(),
            agent_is_registered: false,
            agent_goal: "goal".to_string(),
            action: Action {
                action_id: ActionId::now_v7(),
                action_type: ActionType::ShellCommand,
                tool_name: "bash".to_string(),
                parameters: BTreeMap::new(),
                raw_payload: Json::Null,
                timestamp: chrono::Utc::now(),
            },
            assessment: RiskAssessment::new(0.9, "r", vec![], false, "m", 0.0).unwrap(),
            decision,
            policy_violation: None,
            timestamp: chrono::Utc::now(),
            provenance: BTreeMap::new(),
            framework: "generic".to_string(),
        }
    }

    #[test]
    fn block_becomes_an_error_carrying_the_event() {
        let e = event(Decision::Block);
        let event_id = e.event_id;
        let err = enforce(Decision::Block, e).unwrap_err();
        match err {
            GuardError::Blocked(BlockedByAgentGuard(boxed)) => assert_eq!(boxed.event_id, event_id),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[test]
    fn allow_and_review_pass_through() {
        assert!(enforce(Decision::Allow, event(Decision::Allow)).is_ok());
        assert!(enforce(Decision::Review, event(Decision::Review)).is_ok());
    }
}
