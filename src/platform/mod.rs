//! Remote code-hosting platform collaborator.
//!
//! No concrete client lives in this crate. The orchestrators are generic over
//! [`RemotePlatform`]; the PR conflict validator only needs the narrower
//! [`PullRequestLookup`].

pub mod poll;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PrNumber, PullRequest};

pub use poll::{PollConfig, wait_for_checks};

/// Errors from the remote platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform API returned an error.
    #[error("platform API error: {0}")]
    Api(String),

    #[error("pull request {0} not found")]
    NotFound(PrNumber),

    /// The platform refused to merge.
    #[error("pull request {number} cannot be merged: {reason}")]
    NotMergeable { number: PrNumber, reason: String },

    #[error("checks failed on pull request {0}")]
    ChecksFailed(PrNumber),

    #[error("checks on pull request {number} still pending after {attempts} polls")]
    ChecksTimedOut { number: PrNumber, attempts: u32 },

    #[error("no remote platform client is configured")]
    Unavailable,
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// How a pull request lands on the base branch.
///
/// Merge commits are not offered: history on the base branch stays linear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Squash,
    #[default]
    Rebase,
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMethod::Squash => f.write_str("squash"),
            MergeMethod::Rebase => f.write_str("rebase"),
        }
    }
}

/// Error returned when parsing a [`MergeMethod`] fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported merge method '{0}' (expected squash or rebase)")]
pub struct InvalidMergeMethod(pub String);

impl FromStr for MergeMethod {
    type Err = InvalidMergeMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "squash" => Ok(MergeMethod::Squash),
            "rebase" => Ok(MergeMethod::Rebase),
            _ => Err(InvalidMergeMethod(s.to_string())),
        }
    }
}

/// Aggregate state of a pull request's check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Passing,
    Failing,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: Option<String>,
}

/// Pull-request queries the conflict validator depends on.
pub trait PullRequestLookup {
    /// Open pull requests whose head is `branch`.
    fn list_open_pull_requests(
        &self,
        branch: &str,
    ) -> impl Future<Output = PlatformResult<Vec<PullRequest>>> + Send;

    /// The most recently merged pull request whose head is `branch`.
    fn latest_merged_pull_request(
        &self,
        branch: &str,
    ) -> impl Future<Output = PlatformResult<Option<PullRequest>>> + Send;
}

/// The full remote-platform surface used by the orchestrators.
pub trait RemotePlatform: PullRequestLookup {
    /// Short platform name recorded in session metadata (e.g. "github").
    fn name(&self) -> &str;

    fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> impl Future<Output = PlatformResult<PullRequest>> + Send;

    /// The most recent pull request for `branch`, in any state.
    fn get_pull_request_for_branch(
        &self,
        branch: &str,
    ) -> impl Future<Output = PlatformResult<Option<PullRequest>>> + Send;

    /// Merges the pull request and returns it in its merged state.
    fn merge_pull_request(
        &self,
        number: PrNumber,
        method: MergeMethod,
    ) -> impl Future<Output = PlatformResult<PullRequest>> + Send;

    fn check_status(&self, number: PrNumber)
    -> impl Future<Output = PlatformResult<CheckStatus>> + Send;
}

/// Stand-in for when no platform client is configured. Every call fails with
/// [`PlatformError::Unavailable`], so only platform-free operations (direct
/// hotfix merges) can complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlatform;

impl PullRequestLookup for NoPlatform {
    async fn list_open_pull_requests(&self, _branch: &str) -> PlatformResult<Vec<PullRequest>> {
        Err(PlatformError::Unavailable)
    }

    async fn latest_merged_pull_request(
        &self,
        _branch: &str,
    ) -> PlatformResult<Option<PullRequest>> {
        Err(PlatformError::Unavailable)
    }
}

impl RemotePlatform for NoPlatform {
    fn name(&self) -> &str {
        "none"
    }

    async fn create_pull_request(&self, _request: &NewPullRequest) -> PlatformResult<PullRequest> {
        Err(PlatformError::Unavailable)
    }

    async fn get_pull_request_for_branch(
        &self,
        _branch: &str,
    ) -> PlatformResult<Option<PullRequest>> {
        Err(PlatformError::Unavailable)
    }

    async fn merge_pull_request(
        &self,
        _number: PrNumber,
        _method: MergeMethod,
    ) -> PlatformResult<PullRequest> {
        Err(PlatformError::Unavailable)
    }

    async fn check_status(&self, _number: PrNumber) -> PlatformResult<CheckStatus> {
        Err(PlatformError::Unavailable)
    }
}
