//! AgentGuard Enrichment - deep post-hoc attack-pattern triage
//!
//! Runs asynchronously, off the hot decision path: once the interceptor has
//! already reached a decision, a flagged event is handed here for a second,
//! unhurried LLM pass that names the likely attack pattern, estimates a
//! false-positive likelihood, and is cached in a bounded [`InsightStore`]
//! for later retrieval.

mod client;
mod prompts;
mod store;

pub use client::{AnthropicEnrichmentClient, EnrichmentClient, FallbackEnrichmentClient};
pub use prompts::{build_triage_prompt, enrichment_tool, ENRICH_TOOL_NAME, SYSTEM_PROMPT};
pub use store::{InsightStore, DEFAULT_CAPACITY};
