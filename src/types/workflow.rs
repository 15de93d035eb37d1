//! Workflow types, states, and the actions that move between them.
//!
//! Both workflow types share a single [`WorkflowState`] enum. Each state belongs
//! to exactly one workflow type; [`WorkflowState::workflow_type`] is the
//! membership test used to detect corrupted session records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of workflow a session follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Feature work: branch, commit, push, PR, approval, rebase, merge, cleanup.
    Standard,

    /// Emergency fix: shorter chain, no approval wait, may merge straight to base.
    Hotfix,
}

impl WorkflowType {
    /// The state a new session of this type starts in.
    pub fn initial_state(&self) -> WorkflowState {
        match self {
            WorkflowType::Standard => WorkflowState::Init,
            WorkflowType::Hotfix => WorkflowState::HotfixInit,
        }
    }

    /// Where `launch`/`hotfix` leave a new session.
    pub fn ready_state(&self) -> WorkflowState {
        match self {
            WorkflowType::Standard => WorkflowState::BranchReady,
            WorkflowType::Hotfix => WorkflowState::HotfixBranchReady,
        }
    }

    /// Merged, with the branch still to be deleted.
    pub fn cleanup_state(&self) -> WorkflowState {
        match self {
            WorkflowType::Standard => WorkflowState::Cleanup,
            WorkflowType::Hotfix => WorkflowState::HotfixCleanup,
        }
    }

    pub fn complete_state(&self) -> WorkflowState {
        match self {
            WorkflowType::Standard => WorkflowState::Complete,
            WorkflowType::Hotfix => WorkflowState::HotfixComplete,
        }
    }

    /// The state an aborted session of this type ends in.
    pub fn aborted_state(&self) -> WorkflowState {
        match self {
            WorkflowType::Standard => WorkflowState::Aborted,
            WorkflowType::Hotfix => WorkflowState::HotfixAborted,
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowType::Standard => write!(f, "standard"),
            WorkflowType::Hotfix => write!(f, "hotfix"),
        }
    }
}

/// A session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    // Standard workflow
    Init,
    BranchReady,
    ChangesCommitted,
    Pushed,
    PrCreated,
    WaitingApproval,
    Rebasing,
    Merging,
    Cleanup,
    Complete,
    Aborted,

    // Hotfix workflow
    HotfixInit,
    HotfixBranchReady,
    HotfixCommitted,
    HotfixPushed,
    HotfixPrCreated,
    HotfixMerging,
    HotfixCleanup,
    HotfixComplete,
    HotfixAborted,
}

impl WorkflowState {
    /// Every state, standard first.
    pub const ALL: [WorkflowState; 20] = [
        WorkflowState::Init,
        WorkflowState::BranchReady,
        WorkflowState::ChangesCommitted,
        WorkflowState::Pushed,
        WorkflowState::PrCreated,
        WorkflowState::WaitingApproval,
        WorkflowState::Rebasing,
        WorkflowState::Merging,
        WorkflowState::Cleanup,
        WorkflowState::Complete,
        WorkflowState::Aborted,
        WorkflowState::HotfixInit,
        WorkflowState::HotfixBranchReady,
        WorkflowState::HotfixCommitted,
        WorkflowState::HotfixPushed,
        WorkflowState::HotfixPrCreated,
        WorkflowState::HotfixMerging,
        WorkflowState::HotfixCleanup,
        WorkflowState::HotfixComplete,
        WorkflowState::HotfixAborted,
    ];

    /// The workflow type this state belongs to.
    pub fn workflow_type(&self) -> WorkflowType {
        match self {
            WorkflowState::Init
            | WorkflowState::BranchReady
            | WorkflowState::ChangesCommitted
            | WorkflowState::Pushed
            | WorkflowState::PrCreated
            | WorkflowState::WaitingApproval
            | WorkflowState::Rebasing
            | WorkflowState::Merging
            | WorkflowState::Cleanup
            | WorkflowState::Complete
            | WorkflowState::Aborted => WorkflowType::Standard,
            WorkflowState::HotfixInit
            | WorkflowState::HotfixBranchReady
            | WorkflowState::HotfixCommitted
            | WorkflowState::HotfixPushed
            | WorkflowState::HotfixPrCreated
            | WorkflowState::HotfixMerging
            | WorkflowState::HotfixCleanup
            | WorkflowState::HotfixComplete
            | WorkflowState::HotfixAborted => WorkflowType::Hotfix,
        }
    }

    /// Returns true for states with no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Complete
                | WorkflowState::Aborted
                | WorkflowState::HotfixComplete
                | WorkflowState::HotfixAborted
        )
    }

    /// Returns true for the two abort states.
    pub fn is_aborted(&self) -> bool {
        matches!(self, WorkflowState::Aborted | WorkflowState::HotfixAborted)
    }

    /// The wire name of the state (e.g. `PR_CREATED`).
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Init => "INIT",
            WorkflowState::BranchReady => "BRANCH_READY",
            WorkflowState::ChangesCommitted => "CHANGES_COMMITTED",
            WorkflowState::Pushed => "PUSHED",
            WorkflowState::PrCreated => "PR_CREATED",
            WorkflowState::WaitingApproval => "WAITING_APPROVAL",
            WorkflowState::Rebasing => "REBASING",
            WorkflowState::Merging => "MERGING",
            WorkflowState::Cleanup => "CLEANUP",
            WorkflowState::Complete => "COMPLETE",
            WorkflowState::Aborted => "ABORTED",
            WorkflowState::HotfixInit => "HOTFIX_INIT",
            WorkflowState::HotfixBranchReady => "HOTFIX_BRANCH_READY",
            WorkflowState::HotfixCommitted => "HOTFIX_COMMITTED",
            WorkflowState::HotfixPushed => "HOTFIX_PUSHED",
            WorkflowState::HotfixPrCreated => "HOTFIX_PR_CREATED",
            WorkflowState::HotfixMerging => "HOTFIX_MERGING",
            WorkflowState::HotfixCleanup => "HOTFIX_CLEANUP",
            WorkflowState::HotfixComplete => "HOTFIX_COMPLETE",
            WorkflowState::HotfixAborted => "HOTFIX_ABORTED",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator-visible action; every edge of a workflow graph carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateBranch,
    Commit,
    Push,
    OpenPr,
    AwaitApproval,
    Rebase,
    Merge,
    MergeDirect,
    Cleanup,
    Finish,
    Abort,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::CreateBranch => "create-branch",
            Action::Commit => "commit",
            Action::Push => "push",
            Action::OpenPr => "open-pr",
            Action::AwaitApproval => "await-approval",
            Action::Rebase => "rebase",
            Action::Merge => "merge",
            Action::MergeDirect => "merge-direct",
            Action::Cleanup => "cleanup",
            Action::Finish => "finish",
            Action::Abort => "abort",
        };
        f.write_str(s)
    }
}
