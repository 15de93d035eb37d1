//! Pull-request conflict detection.
//!
//! Decides what shipping a branch should do on the platform side:
//!
//! | Open PRs | Merged PR before | Decision |
//! |----------|------------------|----------|
//! | 0 | no | `create` |
//! | 1 | any | `update` |
//! | 2+ | any | `blocked` |
//! | 0 | yes | `create-new` |
//!
//! `blocked` is never resolved automatically: several open pull requests for
//! one branch means something outside this tool opened them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::platform::{PlatformResult, PullRequestLookup};
use crate::types::PullRequest;

/// The action [`PrConflictCheck`] prescribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrAction {
    Create,
    Update,
    CreateNew,
    Blocked,
}

impl fmt::Display for PrAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrAction::Create => "create",
            PrAction::Update => "update",
            PrAction::CreateNew => "create-new",
            PrAction::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Outcome of [`PrConflictValidator::check_for_pr_conflicts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrConflictCheck {
    /// No pull request exists yet.
    Create,
    /// Push onto the one open pull request.
    Update { existing: PullRequest },
    /// The branch shipped before; open a fresh pull request for the follow-up.
    CreateNew { previous: PullRequest },
    /// More than one open pull request; needs manual cleanup.
    Blocked { open: Vec<PullRequest> },
}

impl PrConflictCheck {
    pub fn action(&self) -> PrAction {
        match self {
            PrConflictCheck::Create => PrAction::Create,
            PrConflictCheck::Update { .. } => PrAction::Update,
            PrConflictCheck::CreateNew { .. } => PrAction::CreateNew,
            PrConflictCheck::Blocked { .. } => PrAction::Blocked,
        }
    }

    pub fn existing_pr(&self) -> Option<&PullRequest> {
        match self {
            PrConflictCheck::Update { existing } => Some(existing),
            _ => None,
        }
    }

    pub fn previous_pr(&self) -> Option<&PullRequest> {
        match self {
            PrConflictCheck::CreateNew { previous } => Some(previous),
            _ => None,
        }
    }

    /// The open pull requests that block shipping. Empty unless blocked.
    pub fn multiple_open(&self) -> &[PullRequest] {
        match self {
            PrConflictCheck::Blocked { open } => open,
            _ => &[],
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, PrConflictCheck::Blocked { .. })
    }
}

/// Checks a branch's pull requests on the platform.
#[derive(Debug, Clone, Copy)]
pub struct PrConflictValidator<'a, P> {
    platform: &'a P,
}

impl<'a, P: PullRequestLookup> PrConflictValidator<'a, P> {
    pub fn new(platform: &'a P) -> Self {
        PrConflictValidator { platform }
    }

    pub async fn check_for_pr_conflicts(&self, branch: &str) -> PlatformResult<PrConflictCheck> {
        let mut open = self.platform.list_open_pull_requests(branch).await?;

        let check = match open.len() {
            0 => match self.platform.latest_merged_pull_request(branch).await? {
                Some(previous) => PrConflictCheck::CreateNew { previous },
                None => PrConflictCheck::Create,
            },
            1 => PrConflictCheck::Update {
                existing: open.remove(0),
            },
            _ => {
                open.sort_by_key(|pr| pr.number);
                tracing::warn!(
                    branch,
                    count = open.len(),
                    "multiple open pull requests for branch"
                );
                PrConflictCheck::Blocked { open }
            }
        };

        tracing::debug!(branch, action = %check.action(), "pull request conflict check");
        Ok(check)
    }
}
