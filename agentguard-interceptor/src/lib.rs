//! AgentGuard Interceptor - the orchestration pipeline
//!
//! Ties normalization, deterministic policy evaluation, LLM risk
//! classification, event logging, and asynchronous enrichment together
//! behind two entry points: the low-level [`Interceptor`] (for callers that
//! already have their collaborators wired) and the [`Guard`] façade (for the
//! common case of wiring everything from the environment in one call).
//! [`AgentAdapter`] is the seam concrete framework bindings implement
//! against.

mod adapter;
mod counters;
mod guard;
mod interceptor;
mod normalizer;

pub use adapter::{enforce, AgentAdapter};
pub use guard::Guard;
pub use interceptor::{InterceptRequest, Interceptor};
pub use normalizer::{
    normalize, normalize_framework_message, normalize_generic, normalize_tool_call_envelope,
};
