//! `abort`: stop a session, optionally deleting its branch.

use crate::git::{BranchScope, VersionControl};
use crate::preflight::{CheckResult, Checklist, checks};
use crate::types::{Session, WorkflowState};

use super::{CommandOutcome, Orchestrator, WorkflowError};

const COMMAND: &str = "abort";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbortOptions {
    /// Session branch. Defaults to the checked-out branch.
    pub branch: Option<String>,
    pub reason: Option<String>,
    /// Also delete the branch locally and on the remote.
    pub delete_branch: bool,
}

impl<G: VersionControl> Orchestrator<'_, G> {
    pub async fn abort(&self, options: &AbortOptions) -> Result<CommandOutcome, WorkflowError> {
        let session = self.resolve_session(options.branch.as_deref()).await?;
        let id = session.id;
        let branch = session.branch_name.clone();
        let base = session.base_branch_or(&self.config.base_branch).to_string();

        let mut preflight = Checklist::new(COMMAND)
            .check(|| async { not_landed(&session) })
            .check(|| checks::session_not_locked(self.store, id));
        if options.delete_branch {
            preflight.push(|| checks::clean_working_tree(self.git));
        }
        let preflight = preflight.run_checks().await;
        if preflight.blocks() {
            return Err(WorkflowError::PreflightFailed {
                command: COMMAND.to_string(),
                report: preflight,
            });
        }

        let guard = self.store.lock_or_busy(id)?;
        let mut session = self.store.require(id)?;
        let reason = options
            .reason
            .clone()
            .unwrap_or_else(|| "aborted by operator".to_string());
        self.abort_session(&mut session, reason.as_str(), COMMAND)?;
        let mut notes = vec![format!("aborted: {}", reason)];

        if options.delete_branch {
            if self.git.current_branch().await? == branch {
                self.git.checkout(&base).await?;
                notes.push(format!("checked out '{}'", base));
            }
            for scope in [BranchScope::Local, BranchScope::Remote] {
                if self.git.branch_exists(&branch, scope).await? {
                    self.git.delete_branch(&branch, scope).await?;
                    notes.push(format!("deleted {} branch '{}'", scope_name(scope), branch));
                }
            }
        }
        guard.release()?;
        let session = self.store.require(id)?;

        let aborted = session.workflow_type.aborted_state();
        let mut postflight = Checklist::new(COMMAND)
            .check(|| checks::session_in_state(self.store, id, aborted))
            .check(|| checks::lock_released(self.store, id));
        if options.delete_branch {
            postflight.push(|| checks::branch_deleted(self.git, &branch, BranchScope::Local));
            postflight.push(|| checks::branch_deleted(self.git, &branch, BranchScope::Remote));
        }
        let postflight = postflight.run_verifications().await;

        Ok(CommandOutcome {
            command: COMMAND.to_string(),
            session,
            preflight,
            postflight,
            notes,
        })
    }
}

/// Merged work is finished with `cleanup`, not aborted.
fn not_landed(session: &Session) -> CheckResult {
    const NAME: &str = "work not merged";
    let state = session.current_state();
    if session.is_merged()
        || matches!(
            state,
            WorkflowState::Cleanup | WorkflowState::HotfixCleanup
        )
    {
        CheckResult::fail(NAME, format!("session is {} and already merged", state))
            .with_suggestions(["finish it with: branchflow cleanup".to_string()])
    } else {
        CheckResult::pass(NAME)
    }
}

fn scope_name(scope: BranchScope) -> &'static str {
    match scope {
        BranchScope::Local => "local",
        BranchScope::Remote => "remote",
    }
}
