//! AgentGuard Analyzer - async LLM-backed risk classification
//!
//! Defines the `RiskClassifier` contract consumed by the interceptor, plus
//! a reference implementation backed by a forced-tool-use call against the
//! Anthropic Messages API. The contract's one hard invariant: classification
//! never raises. Any failure anywhere in this crate degrades to
//! `RiskAssessment::fallback`.

mod classifier;
mod client;
mod prompts;
mod types;

pub use classifier::{AnthropicRiskClassifier, FallbackClassifier, RiskClassifier};
pub use client::AnthropicClient;
pub use prompts::{assess_risk_tool, build_user_prompt, ASSESS_RISK_TOOL_NAME, SYSTEM_PROMPT};
pub use types::{
    ContentBlock, Message, MessageRequest, MessageResponse, ToolChoice, ToolDefinition,
};
