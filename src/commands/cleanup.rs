//! `cleanup`: delete a merged branch, finish its session and collect expired
//! sessions.

use crate::git::{BranchScope, VersionControl};
use crate::preflight::{CheckResult, Checklist, checks};
use crate::types::{Action, Extra, WorkflowState};

use super::{CommandOutcome, Orchestrator, WorkflowError};

const COMMAND: &str = "cleanup";

impl<G: VersionControl> Orchestrator<'_, G> {
    /// Finishes the session on `branch` (or the checked-out branch), which must
    /// be in its cleanup state.
    pub async fn cleanup(&self, branch: Option<&str>) -> Result<CommandOutcome, WorkflowError> {
        let session = self.resolve_session(branch).await?;
        let id = session.id;
        let branch = session.branch_name.clone();
        let base = session.base_branch_or(&self.config.base_branch).to_string();
        let state = session.current_state();

        let preflight = Checklist::new(COMMAND)
            .check(move || async move { awaiting_cleanup(state) })
            .check(|| checks::session_not_locked(self.store, id))
            .check(|| checks::clean_working_tree(self.git))
            .check(|| checks::branch_exists(self.git, &base, BranchScope::Local))
            .run_checks()
            .await;
        if preflight.blocks() {
            return Err(WorkflowError::PreflightFailed {
                command: COMMAND.to_string(),
                report: preflight,
            });
        }

        let guard = self.store.lock_or_busy(id)?;
        let mut session = self.store.require(id)?;
        let mut notes = Vec::new();

        if self.git.current_branch().await? != base {
            self.git.checkout(&base).await?;
            notes.push(format!("checked out '{}'", base));
        }
        if self.git.branch_exists(&branch, BranchScope::Local).await? {
            self.git.delete_branch(&branch, BranchScope::Local).await?;
            notes.push(format!("deleted local branch '{}'", branch));
        }
        if self.git.branch_exists(&branch, BranchScope::Remote).await? {
            self.git.delete_branch(&branch, BranchScope::Remote).await?;
            notes.push(format!("deleted remote branch '{}'", branch));
        }

        self.advance(&mut session, Action::Finish, COMMAND, Extra::new())?;
        guard.release()?;
        let session = self.store.require(id)?;
        tracing::info!(session = %id, branch = %branch, "session complete");

        let removed = self.store.cleanup_expired()?;
        if removed > 0 {
            notes.push(format!("removed {} expired session(s)", removed));
        }

        let done = session.workflow_type.complete_state();
        let postflight = Checklist::new(COMMAND)
            .check(|| checks::current_branch_is(self.git, &base))
            .check(|| checks::branch_deleted(self.git, &branch, BranchScope::Local))
            .check(|| checks::branch_deleted(self.git, &branch, BranchScope::Remote))
            .check(|| checks::session_in_state(self.store, id, done))
            .check(|| checks::lock_released(self.store, id))
            .run_verifications()
            .await;

        Ok(CommandOutcome {
            command: COMMAND.to_string(),
            session,
            preflight,
            postflight,
            notes,
        })
    }
}

fn awaiting_cleanup(state: WorkflowState) -> CheckResult {
    const NAME: &str = "session merged";
    match state {
        WorkflowState::Cleanup | WorkflowState::HotfixCleanup => CheckResult::pass(NAME),
        _ => CheckResult::fail(NAME, format!("session is {}", state)).with_suggestions([
            "merge it first: branchflow ship --merge".to_string(),
            "or drop it: branchflow abort --delete-branch".to_string(),
        ]),
    }
}
