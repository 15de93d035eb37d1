//! `ship`: move the current session's work towards the base branch.
//!
//! Ship is resumable. It looks at the session's state and keeps applying the
//! next step until it has to wait (for approval, or for `--merge`) or reaches
//! cleanup. Every step is persisted, so after a failure the next `ship` picks
//! up where this one stopped.

use chrono::Utc;

use crate::git::{BranchScope, GitError, PushRequest, VersionControl};
use crate::platform::{NewPullRequest, RemotePlatform, wait_for_checks};
use crate::preflight::{CheckResult, Checklist, checks};
use crate::state::StateMachine;
use crate::types::{Action, Extra, PrNumber, PullRequest, Session, WorkflowState, WorkflowType};
use crate::validation::{BranchValidator, PrConflictCheck, PrConflictValidator};

use super::{CommandOutcome, Orchestrator, WorkflowError};

const COMMAND: &str = "ship";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShipOptions {
    /// Commit pending changes with this message first.
    pub message: Option<String>,
    /// Pull request title. Defaults to the commit message, then the branch name.
    pub title: Option<String>,
    pub body: Option<String>,
    /// Go on through checks, rebase and merge instead of stopping at review.
    pub merge: bool,
    /// Hotfix only: merge by pushing onto the base branch, without a pull
    /// request. Implies `merge`.
    pub direct: bool,
}

impl ShipOptions {
    fn merges(&self) -> bool {
        self.merge || self.direct
    }

    /// The state a successful ship leaves the session in.
    fn settles_in(&self, workflow: WorkflowType) -> WorkflowState {
        match workflow {
            _ if self.merges() => workflow.cleanup_state(),
            WorkflowType::Standard => WorkflowState::WaitingApproval,
            WorkflowType::Hotfix => WorkflowState::HotfixPrCreated,
        }
    }

    fn title(&self, branch: &str) -> String {
        self.title
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| branch.to_string())
    }
}

impl<G: VersionControl> Orchestrator<'_, G> {
    /// Ships the session on the checked-out branch.
    pub async fn ship<P: RemotePlatform>(
        &self,
        platform: &P,
        options: &ShipOptions,
    ) -> Result<CommandOutcome, WorkflowError> {
        let session = self.resolve_session(None).await?;
        let id = session.id;
        let branch = session.branch_name.clone();
        let state = session.current_state();
        let hotfix = session.workflow_type == WorkflowType::Hotfix;
        let base = session.base_branch_or(&self.config.base_branch).to_string();

        let mut preflight = Checklist::new(COMMAND)
            .check(move || async move { shippable(state) })
            .check(|| checks::not_on_base_branch(self.git, &base))
            .check(|| checks::session_not_locked(self.store, id))
            .check(|| checks::up_to_date_with_upstream(self.git));
        if options.message.is_none() {
            preflight.push(|| checks::clean_working_tree(self.git));
        }
        if options.direct {
            preflight.push(move || async move { direct_allowed(hotfix) });
        } else {
            preflight.push(|| checks::no_pr_conflicts(platform, &branch));
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

        let validator = BranchValidator::new(self.store);
        let reuse = validator.detect_branch_reuse(&session, &branch)?;
        if !reuse.available {
            let kind = reuse
                .reuse_detected
                .map(|d| d.kind.to_string())
                .unwrap_or_default();
            let suggestions = validator.check_branch_name_availability(&branch)?.suggestions;
            return Err(WorkflowError::BranchConflict {
                branch,
                reason: format!("branch reuse detected ({})", kind),
                suggestions,
            });
        }

        let mut notes = Vec::new();
        self.commit_pending(&mut session, options, &mut notes).await?;
        self.drive(platform, &mut session, options, &mut notes)
            .await?;
        guard.release()?;
        let session = self.store.require(id)?;

        let reached = options.settles_in(session.workflow_type);
        let postflight = Checklist::new(COMMAND)
            .check(|| checks::session_in_state(self.store, id, reached))
            .check(|| checks::lock_released(self.store, id))
            .check(|| checks::branch_exists(self.git, &branch, BranchScope::Remote))
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

    /// Commits uncommitted changes when a message was given.
    async fn commit_pending(
        &self,
        session: &mut Session,
        options: &ShipOptions,
        notes: &mut Vec<String>,
    ) -> Result<(), WorkflowError> {
        let Some(message) = options.message.as_deref() else {
            return Ok(());
        };
        if !self.git.has_uncommitted_changes().await? {
            notes.push("no uncommitted changes to commit".to_string());
            return Ok(());
        }

        self.git.commit(message).await?;
        notes.push(format!("committed \"{}\"", message));

        // From a pushed or rebasing state the new commit simply rides along
        // with the next push.
        let machine = StateMachine::for_session(session);
        if machine
            .target_for(session.current_state(), Action::Commit)
            .is_some()
        {
            self.advance(session, Action::Commit, COMMAND, Extra::new())?;
        }
        Ok(())
    }

    /// Applies steps until the session has to wait or reaches cleanup.
    async fn drive<P: RemotePlatform>(
        &self,
        platform: &P,
        session: &mut Session,
        options: &ShipOptions,
        notes: &mut Vec<String>,
    ) -> Result<(), WorkflowError> {
        use WorkflowState::*;

        let branch = session.branch_name.clone();
        let base = session.base_branch_or(&self.config.base_branch).to_string();
        let hotfix = session.workflow_type == WorkflowType::Hotfix;

        loop {
            let state = session.current_state();
            tracing::debug!(session = %session.id, %state, "ship step");
            match state {
                BranchReady | HotfixBranchReady => {
                    if self.git.commits_since(&base).await? == 0 {
                        return Err(WorkflowError::NothingToShip);
                    }
                    self.advance(session, Action::Commit, COMMAND, Extra::new())?;
                }

                ChangesCommitted | HotfixCommitted => {
                    self.git.push(&PushRequest::branch(&branch)).await?;
                    notes.push(format!("pushed '{}'", branch));
                    self.advance(session, Action::Push, COMMAND, Extra::new())?;
                }

                HotfixPushed if options.direct => {
                    self.advance(session, Action::MergeDirect, COMMAND, Extra::new())?;
                }

                Pushed | HotfixPushed => {
                    if self.git.branch_status().await?.ahead > 0 {
                        self.git.push(&PushRequest::branch(&branch)).await?;
                        notes.push(format!("pushed '{}'", branch));
                    }
                    let pr = self
                        .open_or_update_pull_request(platform, &branch, &base, options, notes)
                        .await?;
                    session.metadata.pull_request = Some(pr.link());
                    session.metadata.platform = Some(platform.name().to_string());
                    self.advance(session, Action::OpenPr, COMMAND, pr_metadata(pr.number))?;
                }

                PrCreated if !options.merges() => {
                    self.advance(session, Action::AwaitApproval, COMMAND, Extra::new())?;
                }
                HotfixPrCreated if !options.merges() => return Ok(()),
                WaitingApproval if !options.merges() => return Ok(()),

                PrCreated | WaitingApproval => {
                    let number = self.linked_pull_request(platform, session).await?;
                    wait_for_checks(platform, number, &self.config.poll.to_poll_config()).await?;
                    notes.push(format!("checks passed on {}", number));
                    self.advance(session, Action::Rebase, COMMAND, Extra::new())?;
                }

                HotfixPrCreated => {
                    self.advance(session, Action::Merge, COMMAND, Extra::new())?;
                }

                // Left behind by an interrupted `ship --merge`; without
                // `--merge` go back to review instead of merging.
                Rebasing if !options.merges() => {
                    self.advance(session, Action::AwaitApproval, COMMAND, Extra::new())?;
                }

                Rebasing => {
                    self.git.fetch().await?;
                    if let Err(e) = self.git.rebase_onto(&base).await {
                        if matches!(e, GitError::RebaseConflict { .. }) {
                            self.advance(
                                session,
                                Action::AwaitApproval,
                                COMMAND,
                                Extra::from([("rebase_conflict".to_string(), true.into())]),
                            )?;
                        }
                        return Err(e.into());
                    }
                    self.git
                        .push(&PushRequest::branch(&branch).force_with_lease())
                        .await?;
                    notes.push(format!("rebased onto '{}'", base));
                    self.advance(session, Action::Merge, COMMAND, Extra::new())?;
                }

                Merging | HotfixMerging => {
                    self.merge(platform, session, hotfix, &base, notes).await?;
                    self.advance(session, Action::Cleanup, COMMAND, Extra::new())?;
                }

                Cleanup | HotfixCleanup => return Ok(()),

                Init | HotfixInit | Complete | Aborted | HotfixComplete | HotfixAborted => {
                    return Err(WorkflowError::WrongState {
                        command: COMMAND.to_string(),
                        session: session.id,
                        state,
                        expected: "a launched, unfinished session".to_string(),
                    });
                }
            }
        }
    }

    async fn open_or_update_pull_request<P: RemotePlatform>(
        &self,
        platform: &P,
        branch: &str,
        base: &str,
        options: &ShipOptions,
        notes: &mut Vec<String>,
    ) -> Result<PullRequest, WorkflowError> {
        match PrConflictValidator::new(platform)
            .check_for_pr_conflicts(branch)
            .await?
        {
            PrConflictCheck::Blocked { open } => Err(WorkflowError::PrConflict {
                branch: branch.to_string(),
                open,
            }),
            PrConflictCheck::Update { existing } => {
                notes.push(format!(
                    "updated pull request {} {}",
                    existing.number, existing.url
                ));
                Ok(existing)
            }
            check @ (PrConflictCheck::Create | PrConflictCheck::CreateNew { .. }) => {
                if let Some(previous) = check.previous_pr() {
                    notes.push(format!(
                        "previous pull request {} was merged; opening a new one",
                        previous.number
                    ));
                }
                let pr = platform
                    .create_pull_request(&NewPullRequest {
                        head: branch.to_string(),
                        base: base.to_string(),
                        title: options.title(branch),
                        body: options.body.clone(),
                    })
                    .await?;
                tracing::info!(branch, pr = %pr.number, url = %pr.url, "pull request opened");
                notes.push(format!("opened pull request {} {}", pr.number, pr.url));
                Ok(pr)
            }
        }
    }

    /// The session's pull request number, looked up on the platform if the
    /// session never recorded one.
    async fn linked_pull_request<P: RemotePlatform>(
        &self,
        platform: &P,
        session: &Session,
    ) -> Result<PrNumber, WorkflowError> {
        if let Some(link) = &session.metadata.pull_request {
            return Ok(link.number);
        }
        platform
            .get_pull_request_for_branch(&session.branch_name)
            .await?
            .map(|pr| pr.number)
            .ok_or_else(|| WorkflowError::NoPullRequest(session.branch_name.clone()))
    }

    /// Lands the branch on the base branch and records the merge.
    async fn merge<P: RemotePlatform>(
        &self,
        platform: &P,
        session: &mut Session,
        hotfix: bool,
        base: &str,
        notes: &mut Vec<String>,
    ) -> Result<(), WorkflowError> {
        let branch = session.branch_name.clone();
        let Some(mut link) = session.metadata.pull_request.clone() else {
            if !hotfix {
                return Err(WorkflowError::NoPullRequest(branch));
            }
            self.git
                .push(&PushRequest::branch(&branch).onto(base))
                .await?;
            tracing::info!(session = %session.id, branch = %branch, base, "hotfix pushed onto base");
            notes.push(format!("pushed '{}' directly onto '{}'", branch, base));
            return Ok(());
        };

        let already_merged = platform
            .get_pull_request_for_branch(&branch)
            .await?
            .filter(|pr| pr.number == link.number)
            .and_then(|pr| pr.state.merged_at());
        let merged_at = match already_merged {
            Some(at) => {
                notes.push(format!("pull request {} was already merged", link.number));
                at
            }
            None => {
                let method = self.config.merge_method;
                let merged = platform.merge_pull_request(link.number, method).await?;
                tracing::info!(session = %session.id, pr = %link.number, %method, "pull request merged");
                notes.push(format!("merged pull request {} ({})", link.number, method));
                merged.state.merged_at().unwrap_or_else(Utc::now)
            }
        };
        link.mark_merged(merged_at);
        session.metadata.pull_request = Some(link);
        Ok(())
    }
}

fn pr_metadata(number: PrNumber) -> Extra {
    Extra::from([("pull_request".to_string(), number.0.into())])
}

fn shippable(state: WorkflowState) -> CheckResult {
    const NAME: &str = "session can ship";
    use WorkflowState::*;
    match state {
        Init | HotfixInit => CheckResult::fail(NAME, "branch was never set up"),
        Cleanup | HotfixCleanup => CheckResult::fail(NAME, "already merged")
            .with_suggestions(["finish it with: branchflow cleanup".to_string()]),
        s if s.is_terminal() => CheckResult::fail(NAME, format!("session is {}", s)),
        s => CheckResult::pass(NAME).with_message(s.to_string()),
    }
}

fn direct_allowed(hotfix: bool) -> CheckResult {
    const NAME: &str = "direct merge allowed";
    if hotfix {
        CheckResult::pass(NAME)
    } else {
        CheckResult::fail(NAME, "only hotfix sessions may skip the pull request")
    }
}
