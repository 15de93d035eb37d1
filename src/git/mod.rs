//! Version-control collaborator.
//!
//! The workflow engine only talks to git through [`VersionControl`]; it never
//! parses raw command output itself. [`GitCli`] implements the trait by shelling
//! out to `git` in a working copy.

pub mod cli;

use std::future::Future;

use thiserror::Error;

pub use cli::{CommitIdentity, GitCli};

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Push was rejected by the remote.
    #[error("push rejected: {details}")]
    PushRejected { details: String },

    /// Rebase stopped on conflicts and was aborted.
    #[error("rebase onto {onto} hit conflicts and was aborted")]
    RebaseConflict { onto: String },

    /// HEAD is not on a branch.
    #[error("HEAD is detached")]
    DetachedHead,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Where a branch lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchScope {
    Local,
    Remote,
}

/// Relationship between the current branch and its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchStatus {
    /// Commits on the local branch not on its upstream.
    pub ahead: u32,
    /// Commits on the upstream not on the local branch.
    pub behind: u32,
    /// No uncommitted changes in the working tree or index.
    pub is_clean: bool,
    /// An upstream branch is configured and exists.
    pub has_remote: bool,
}

/// A push request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Local branch to push.
    pub branch: String,
    /// Remote branch to update; defaults to `branch`.
    pub target: Option<String>,
    /// Use `--force-with-lease` (after a rebase).
    pub force_with_lease: bool,
    /// Record the remote branch as upstream.
    pub set_upstream: bool,
}

impl PushRequest {
    /// Plain push of `branch` to the same name, setting upstream.
    pub fn branch(branch: impl Into<String>) -> Self {
        PushRequest {
            branch: branch.into(),
            target: None,
            force_with_lease: false,
            set_upstream: true,
        }
    }

    /// Push after history was rewritten.
    pub fn force_with_lease(mut self) -> Self {
        self.force_with_lease = true;
        self
    }

    /// Push `branch` onto a different remote branch.
    pub fn onto(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self.set_upstream = false;
        self
    }

    /// The remote branch this push updates.
    pub fn target_branch(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.branch)
    }
}

/// Operations the workflow engine needs from the version-control tool.
pub trait VersionControl {
    /// The branch HEAD points to.
    fn current_branch(&self) -> impl Future<Output = GitResult<String>> + Send;

    /// Returns true if the branch exists in the given scope.
    fn branch_exists(
        &self,
        name: &str,
        scope: BranchScope,
    ) -> impl Future<Output = GitResult<bool>> + Send;

    /// Creates `name` from `base` and checks it out.
    fn create_branch(&self, name: &str, base: &str)
    -> impl Future<Output = GitResult<()>> + Send;

    fn checkout(&self, name: &str) -> impl Future<Output = GitResult<()>> + Send;

    /// Stages everything and commits it.
    fn commit(&self, message: &str) -> impl Future<Output = GitResult<()>> + Send;

    fn push(&self, request: &PushRequest) -> impl Future<Output = GitResult<()>> + Send;

    fn delete_branch(
        &self,
        name: &str,
        scope: BranchScope,
    ) -> impl Future<Output = GitResult<()>> + Send;

    fn has_uncommitted_changes(&self) -> impl Future<Output = GitResult<bool>> + Send;

    /// Status of the current branch against its upstream.
    fn branch_status(&self) -> impl Future<Output = GitResult<BranchStatus>> + Send;

    /// Number of commits on HEAD that are not on the local `base` branch.
    fn commits_since(&self, base: &str) -> impl Future<Output = GitResult<u32>> + Send;

    /// Updates remote-tracking refs.
    fn fetch(&self) -> impl Future<Output = GitResult<()>> + Send;

    /// Rebases the current branch onto the remote-tracking `base`.
    fn rebase_onto(&self, base: &str) -> impl Future<Output = GitResult<()>> + Send;

    /// URL of the configured remote, if any.
    fn remote_url(&self) -> impl Future<Output = GitResult<Option<String>>> + Send;
}
