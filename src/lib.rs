//! Branchflow - a git workflow integrity engine.
//!
//! Sessions track one branch each through a fixed workflow (standard feature
//! work, or an expedited hotfix). Every mutating command is gated by
//! pre-flight checks, holds the session's lock while it works, and records
//! each state change before moving on, so history stays linear and a failed
//! command leaves a state the next one can resume from.
//!
//! The library is the engine; `main.rs` is a thin command-line front end.

pub mod commands;
pub mod config;
pub mod git;
pub mod persistence;
pub mod platform;
pub mod preflight;
pub mod state;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod test_utils;
