//! `swap`: switch the working copy to another session's branch.

use crate::git::{BranchScope, VersionControl};
use crate::preflight::{Checklist, checks};

use super::{CommandOutcome, Orchestrator, WorkflowError};

const COMMAND: &str = "swap";

impl<G: VersionControl> Orchestrator<'_, G> {
    /// Checks out `branch`, which must have an active, unlocked session.
    /// The session's state does not change.
    pub async fn swap(&self, branch: &str) -> Result<CommandOutcome, WorkflowError> {
        let target = self.store.get_by_branch(branch)?;

        let mut preflight = Checklist::new(COMMAND)
            .check(|| checks::clean_working_tree(self.git))
            .check(|| checks::session_exists(self.store, branch))
            .check(|| checks::branch_exists(self.git, branch, BranchScope::Local));
        if let Some(target) = &target {
            let id = target.id;
            preflight.push(move || checks::session_not_locked(self.store, id));
        }
        let preflight = preflight.run_checks().await;
        if preflight.blocks() {
            return Err(WorkflowError::PreflightFailed {
                command: COMMAND.to_string(),
                report: preflight,
            });
        }
        let session = target.ok_or_else(|| WorkflowError::NoSession(branch.to_string()))?;

        let guard = self.store.lock_or_busy(session.id)?;
        let previous = self.git.current_branch().await?;
        self.git.checkout(branch).await?;
        guard.release()?;
        tracing::info!(session = %session.id, from = %previous, to = branch, "swapped branch");

        let postflight = Checklist::new(COMMAND)
            .check(|| checks::current_branch_is(self.git, branch))
            .check(|| checks::lock_released(self.store, session.id))
            .run_verifications()
            .await;

        Ok(CommandOutcome {
            command: COMMAND.to_string(),
            notes: vec![format!(
                "switched from '{}' to '{}' ({})",
                previous,
                branch,
                session.current_state()
            )],
            session,
            preflight,
            postflight,
        })
    }
}
