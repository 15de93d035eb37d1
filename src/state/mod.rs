//! Pure state logic for workflow sessions.
//!
//! This module contains the functional core: the transition graphs of each
//! workflow type and the state machine that validates and records transitions.
//! All I/O is handled elsewhere.

pub mod graph;
pub mod transitions;

// Re-export commonly used types and functions
pub use graph::{Edge, HOTFIX_EDGES, STANDARD_EDGES};
pub use transitions::{StateMachine, TransitionError, apply_action};
