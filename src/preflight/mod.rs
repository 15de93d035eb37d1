//! Pre-flight and post-flight checks.
//!
//! Every mutating command runs a pre-flight [`Checklist`] before touching
//! anything and a post-flight one afterwards:
//!
//! 1. **Pre-flight** ([`Checklist::run_checks`]): the command proceeds only if
//!    every error-level check passed. Warning-level failures are shown but do
//!    not block.
//!
//! 2. **Post-flight** ([`Checklist::run_verifications`]): reports drift between
//!    the expected and actual state. Never blocks; the work already happened,
//!    and undoing it is the command's job, not this module's.
//!
//! Reusable checks live in [`checks`].

pub mod check;
pub mod checks;

pub use check::{CheckFuture, CheckLevel, CheckPhase, CheckReport, CheckResult, Checklist};
