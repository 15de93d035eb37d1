//! Pull request types.
//!
//! [`PullRequest`] is what the remote platform reports about a pull request.
//! [`PrLink`] is the slice of that information a session keeps in its metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PrNumber;

/// The state of a pull request on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrState {
    /// The PR is open.
    Open,

    /// The PR was merged.
    Merged {
        /// When the platform recorded the merge.
        merged_at: DateTime<Utc>,
    },

    /// The PR was closed without merging.
    Closed,
}

impl PrState {
    /// Returns true if the PR is open.
    pub fn is_open(&self) -> bool {
        matches!(self, PrState::Open)
    }

    /// Returns true if the PR was merged.
    pub fn is_merged(&self) -> bool {
        matches!(self, PrState::Merged { .. })
    }

    /// Returns the merge timestamp if the PR was merged.
    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PrState::Merged { merged_at } => Some(*merged_at),
            _ => None,
        }
    }
}

/// A pull request as reported by the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// The PR number.
    pub number: PrNumber,

    /// Web URL of the PR.
    pub url: String,

    /// The branch the PR merges from.
    pub head_ref: String,

    /// The branch the PR targets (e.g., "main").
    pub base_ref: String,

    /// Title shown on the platform.
    pub title: String,

    /// Current state of the PR.
    pub state: PrState,
}

impl PullRequest {
    /// Builds the session-side linkage record for this PR.
    pub fn link(&self) -> PrLink {
        PrLink {
            number: self.number,
            url: self.url.clone(),
            merged: self.state.is_merged(),
            merged_at: self.state.merged_at(),
        }
    }
}

/// Pull-request linkage stored in session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrLink {
    /// The PR number.
    pub number: PrNumber,

    /// Web URL of the PR.
    pub url: String,

    /// Whether the PR has been merged.
    #[serde(default)]
    pub merged: bool,

    /// When the PR was merged, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PrLink {
    /// Marks the linked PR as merged at the given time.
    pub fn mark_merged(&mut self, at: DateTime<Utc>) {
        self.merged = true;
        self.merged_at = Some(at);
    }
}
