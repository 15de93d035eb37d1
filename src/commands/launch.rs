//! `launch` and `hotfix`: start a session and its branch.

use crate::git::{BranchScope, VersionControl};
use crate::preflight::{CheckResult, Checklist, checks};
use crate::types::{Action, Extra, SessionMetadata, Severity, WorkflowType};

use super::{CommandOutcome, Orchestrator, WorkflowError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub branch: String,
    /// Branch to start from. Defaults to the configured base branch.
    pub base: Option<String>,
}

impl<G: VersionControl> Orchestrator<'_, G> {
    /// Starts a standard session on a new branch.
    pub async fn launch(&self, options: &LaunchOptions) -> Result<CommandOutcome, WorkflowError> {
        let base = options
            .base
            .clone()
            .unwrap_or_else(|| self.config.base_branch.clone());
        self.start("launch", WorkflowType::Standard, &options.branch, base, None)
            .await
    }

    /// Starts a hotfix session. Hotfixes always branch from the configured base.
    pub async fn hotfix(
        &self,
        branch: &str,
        severity: Severity,
    ) -> Result<CommandOutcome, WorkflowError> {
        let base = self.config.base_branch.clone();
        self.start("hotfix", WorkflowType::Hotfix, branch, base, Some(severity))
            .await
    }

    async fn start(
        &self,
        command: &str,
        workflow: WorkflowType,
        branch: &str,
        base: String,
        severity: Option<Severity>,
    ) -> Result<CommandOutcome, WorkflowError> {
        let preflight = Checklist::new(command)
            .check(|| checks::branch_name_syntax(branch))
            .check(|| async { apart_from_base(branch, &base) })
            .check(|| checks::clean_working_tree(self.git))
            .check(|| checks::branch_available(self.store, branch))
            .check(|| checks::branch_exists(self.git, &base, BranchScope::Local))
            .run_checks()
            .await;
        if preflight.blocks() {
            return Err(WorkflowError::PreflightFailed {
                command: command.to_string(),
                report: preflight,
            });
        }

        let mut notes: Vec<String> = preflight
            .results
            .iter()
            .filter(|r| r.passed)
            .filter_map(|r| r.message.clone())
            .collect();

        let metadata = SessionMetadata {
            project_path: self.project_path.clone(),
            remote_url: self.git.remote_url().await?,
            base_branch: Some(base.clone()),
            severity,
            ..SessionMetadata::default()
        };
        let mut session = self.store.create(workflow, branch, metadata)?;
        let guard = self.store.lock_or_busy(session.id)?;

        let switched = if self.git.branch_exists(branch, BranchScope::Local).await? {
            notes.push(format!("checked out existing branch '{}'", branch));
            self.git.checkout(branch).await
        } else {
            notes.push(format!("created '{}' from '{}'", branch, base));
            self.git.create_branch(branch, &base).await
        };
        if let Err(e) = switched {
            self.abort_session(&mut session, format!("branch setup failed: {}", e), command)?;
            return Err(e.into());
        }

        self.advance(&mut session, Action::CreateBranch, command, Extra::new())?;
        guard.release()?;
        let session = self.store.require(session.id)?;

        tracing::info!(
            session = %session.id,
            branch,
            workflow = %workflow,
            "session launched"
        );

        let ready = workflow.ready_state();
        let postflight = Checklist::new(command)
            .check(|| checks::current_branch_is(self.git, branch))
            .check(|| checks::session_in_state(self.store, session.id, ready))
            .check(|| checks::lock_released(self.store, session.id))
            .run_verifications()
            .await;

        Ok(CommandOutcome {
            command: command.to_string(),
            session,
            preflight,
            postflight,
            notes,
        })
    }
}

fn apart_from_base(branch: &str, base: &str) -> CheckResult {
    const NAME: &str = "branch is not the base branch";
    if branch == base {
        CheckResult::fail(NAME, format!("'{}' is the base branch", branch))
    } else {
        CheckResult::pass(NAME)
    }
}
