//! AgentGuard Core - shared types
//!
//! Data model, identity, and error types shared by every other AgentGuard
//! crate. This crate holds no business logic beyond what's needed to
//! construct its own types safely (e.g. the fallible `RiskAssessment`
//! constructor).

mod detect;
mod error;
mod identity;
mod models;
mod telemetry;

pub use detect::*;
pub use error::*;
pub use identity::*;
pub use models::*;
pub use telemetry::*;
