//! Core domain types for the workflow engine.
//!
//! This module contains the fundamental types used throughout the application,
//! designed to encode invariants via the type system.

pub mod ids;
pub mod pr;
pub mod session;
pub mod workflow;

// Re-export commonly used types at the module level
pub use ids::{InvalidSessionId, PrNumber, SessionId};
pub use pr::{PrLink, PrState, PullRequest};
pub use session::{Extra, InvalidSeverity, Session, SessionMetadata, Severity, TransitionRecord};
pub use workflow::{Action, WorkflowState, WorkflowType};
