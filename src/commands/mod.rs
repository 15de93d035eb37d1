//! Command orchestrators.
//!
//! Each mutating command follows the same shape:
//!
//! 1. Resolve the session (by `--branch`, or the checked-out branch).
//! 2. Run a pre-flight [`Checklist`](crate::preflight::Checklist); stop with
//!    [`WorkflowError::PreflightFailed`] if it blocks.
//! 3. Take the session's lock. The guard releases it on every exit path.
//! 4. Do the work, persisting the session after every transition so a failure
//!    part-way leaves a resumable state on disk.
//! 5. Release the lock and run the post-flight verifications.
//!
//! # Commands
//!
//! - [`launch`](Orchestrator::launch) / [`hotfix`](Orchestrator::hotfix): start
//!   a session and its branch
//! - [`ship`](Orchestrator::ship): commit, push, open or update the PR, and
//!   with `merge` take it all the way to cleanup
//! - [`swap`](Orchestrator::swap): check out another session's branch
//! - [`abort`](Orchestrator::abort): stop a session
//! - [`cleanup`](Orchestrator::cleanup): delete a merged branch and finish
//! - [`status`](Orchestrator::status) / [`list`](Orchestrator::list): read-only

mod abort;
mod cleanup;
mod error;
mod launch;
mod ship;
mod status;
mod swap;

use std::path::PathBuf;

use crate::config::Config;
use crate::git::VersionControl;
use crate::persistence::SessionStore;
use crate::preflight::CheckReport;
use crate::state::apply_action;
use crate::types::{Action, Extra, Session};

pub use abort::AbortOptions;
pub use error::{ErrorKind, WorkflowError};
pub use launch::LaunchOptions;
pub use ship::ShipOptions;
pub use status::SessionSummary;

/// What a command did.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command: String,
    /// The session as persisted when the command finished.
    pub session: Session,
    pub preflight: CheckReport,
    pub postflight: CheckReport,
    /// Human-readable notes on what happened, in order.
    pub notes: Vec<String>,
}

/// Runs commands against one working copy and session store.
#[derive(Debug)]
pub struct Orchestrator<'a, G> {
    store: &'a SessionStore,
    git: &'a G,
    config: &'a Config,
    project_path: Option<PathBuf>,
}

impl<'a, G: VersionControl> Orchestrator<'a, G> {
    pub fn new(store: &'a SessionStore, git: &'a G, config: &'a Config) -> Self {
        Orchestrator {
            store,
            git,
            config,
            project_path: None,
        }
    }

    /// Recorded in the metadata of sessions this orchestrator starts.
    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// The active session on `branch`, or on the checked-out branch.
    async fn resolve_session(&self, branch: Option<&str>) -> Result<Session, WorkflowError> {
        let branch = match branch {
            Some(branch) => branch.to_string(),
            None => self.git.current_branch().await?,
        };
        self.store
            .get_by_branch(&branch)?
            .ok_or(WorkflowError::NoSession(branch))
    }

    /// Applies `action` and persists the result.
    fn advance(
        &self,
        session: &mut Session,
        action: Action,
        trigger: &str,
        metadata: Extra,
    ) -> Result<(), WorkflowError> {
        apply_action(session, action, trigger, metadata)?;
        *session = self.store.update(session)?;
        Ok(())
    }

    /// Moves the session to its aborted state, recording why.
    fn abort_session(
        &self,
        session: &mut Session,
        reason: impl Into<String>,
        trigger: &str,
    ) -> Result<(), WorkflowError> {
        let reason = reason.into();
        tracing::warn!(session = %session.id, branch = %session.branch_name, %reason, "aborting session");
        session.metadata.abort_reason = Some(reason);
        self.advance(session, Action::Abort, trigger, Extra::new())
    }
}
