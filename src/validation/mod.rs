//! Branch and pull-request validators.
//!
//! - [`name`]: git branch-name syntax and alternative-name suggestions.
//! - [`branch`]: whether a branch name may be (re)used, from stored session
//!   history.
//! - [`pr`]: whether shipping should create, update or refuse a pull request,
//!   from the platform's view of the branch.

pub mod branch;
pub mod name;
pub mod pr;

pub use branch::{
    BranchAvailability, BranchHistory, BranchReuse, BranchValidator, ReuseDetected, ReuseKind,
};
pub use name::{InvalidBranchName, is_valid_branch_name, suggest_alternatives, validate_branch_name};
pub use pr::{PrAction, PrConflictCheck, PrConflictValidator};
