//! The orchestrator-boundary error.

use thiserror::Error;

use crate::git::GitError;
use crate::persistence::{IntegrityError, LockError, StoreError};
use crate::platform::PlatformError;
use crate::preflight::CheckReport;
use crate::state::TransitionError;
use crate::types::{PullRequest, SessionId, WorkflowState};

/// Broad classes of failure, for callers that decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A rule said no; nothing was changed.
    Validation,
    /// The requested work collides with existing history or remote state.
    Conflict,
    /// Persisted state is inconsistent and needs a human.
    Integrity,
    /// Another operation holds the session.
    Busy,
    /// The version-control tool or the platform failed.
    External,
}

/// Errors returned by the command orchestrators.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{command}: pre-flight checks failed: {}", .report.blocking_summary())]
    PreflightFailed {
        command: String,
        report: CheckReport,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("branch '{branch}' cannot be used: {reason}")]
    BranchConflict {
        branch: String,
        reason: String,
        suggestions: Vec<String>,
    },

    #[error("branch '{branch}' has {} open pull requests", .open.len())]
    PrConflict {
        branch: String,
        open: Vec<PullRequest>,
    },

    #[error("session {0} is busy: another operation holds its lock")]
    SessionBusy(SessionId),

    #[error("no active session on '{0}'")]
    NoSession(String),

    #[error("{command}: session {session} is {state}, expected {expected}")]
    WrongState {
        command: String,
        session: SessionId,
        state: WorkflowState,
        expected: String,
    },

    #[error("nothing to ship: no commits since the branch was created")]
    NothingToShip,

    #[error("no pull request found for '{0}'")]
    NoPullRequest(String),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Integrity(IntegrityError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Integrity(e) => WorkflowError::Integrity(e),
            StoreError::BranchInUse { branch, session } => WorkflowError::BranchConflict {
                reason: format!("session {} is already active on it", session.short()),
                branch,
                suggestions: Vec::new(),
            },
            e => WorkflowError::Store(e),
        }
    }
}

impl From<LockError> for WorkflowError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Busy(id) => WorkflowError::SessionBusy(id),
            LockError::Store(e) => e.into(),
        }
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::PreflightFailed { .. }
            | WorkflowError::NoSession(_)
            | WorkflowError::WrongState { .. }
            | WorkflowError::NothingToShip
            | WorkflowError::NoPullRequest(_) => ErrorKind::Validation,
            WorkflowError::Transition(e) if e.is_integrity() => ErrorKind::Integrity,
            WorkflowError::Transition(_) => ErrorKind::Validation,
            WorkflowError::BranchConflict { .. } | WorkflowError::PrConflict { .. } => {
                ErrorKind::Conflict
            }
            WorkflowError::Git(GitError::RebaseConflict { .. }) => ErrorKind::Conflict,
            WorkflowError::SessionBusy(_) => ErrorKind::Busy,
            WorkflowError::Integrity(_) => ErrorKind::Integrity,
            WorkflowError::Git(_) | WorkflowError::Platform(_) | WorkflowError::Store(_) => {
                ErrorKind::External
            }
        }
    }

    /// Remediation hints for the operator.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            WorkflowError::PreflightFailed { report, .. } => report.suggestions(),
            WorkflowError::BranchConflict { suggestions, .. } => suggestions.clone(),
            WorkflowError::PrConflict { open, .. } => open
                .iter()
                .map(|pr| format!("close all but one: {} {}", pr.number, pr.url))
                .collect(),
            WorkflowError::SessionBusy(id) => vec![format!(
                "wait for the other operation, or if it died: branchflow unlock {}",
                id
            )],
            WorkflowError::NoSession(branch) => {
                vec![format!("start one with: branchflow launch {}", branch)]
            }
            WorkflowError::Git(GitError::RebaseConflict { onto }) => vec![
                format!("rebase onto {} by hand, resolve the conflicts", onto),
                "then run: branchflow ship --merge".to_string(),
            ],
            WorkflowError::Integrity(_) => {
                vec!["inspect the session files under the state directory".to_string()]
            }
            _ => Vec::new(),
        }
    }
}
