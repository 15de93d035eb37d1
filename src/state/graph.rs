//! Transition graphs for each workflow type.
//!
//! Only forward edges are listed. The abort edge (every non-terminal state to the
//! workflow's aborted state) is implied and added by [`edges`].

use crate::types::{Action, WorkflowState, WorkflowType};

use WorkflowState::*;

/// A labelled edge of a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub action: Action,
}

const fn edge(from: WorkflowState, to: WorkflowState, action: Action) -> Edge {
    Edge { from, to, action }
}

/// Standard feature workflow.
pub const STANDARD_EDGES: &[Edge] = &[
    edge(Init, BranchReady, Action::CreateBranch),
    edge(BranchReady, ChangesCommitted, Action::Commit),
    edge(ChangesCommitted, Pushed, Action::Push),
    edge(Pushed, PrCreated, Action::OpenPr),
    edge(PrCreated, WaitingApproval, Action::AwaitApproval),
    edge(PrCreated, Rebasing, Action::Rebase),
    // Follow-up commits onto the open PR.
    edge(PrCreated, ChangesCommitted, Action::Commit),
    edge(WaitingApproval, Rebasing, Action::Rebase),
    edge(WaitingApproval, ChangesCommitted, Action::Commit),
    edge(Rebasing, Merging, Action::Merge),
    // A rebase that rewrote commits re-triggers review and checks.
    edge(Rebasing, WaitingApproval, Action::AwaitApproval),
    edge(Merging, Cleanup, Action::Cleanup),
    edge(Cleanup, Complete, Action::Finish),
];

/// Emergency hotfix workflow.
pub const HOTFIX_EDGES: &[Edge] = &[
    edge(HotfixInit, HotfixBranchReady, Action::CreateBranch),
    edge(HotfixBranchReady, HotfixCommitted, Action::Commit),
    edge(HotfixCommitted, HotfixPushed, Action::Push),
    edge(HotfixPushed, HotfixPrCreated, Action::OpenPr),
    // Straight to the base branch, no pull request.
    edge(HotfixPushed, HotfixMerging, Action::MergeDirect),
    edge(HotfixPrCreated, HotfixMerging, Action::Merge),
    edge(HotfixPrCreated, HotfixCommitted, Action::Commit),
    edge(HotfixMerging, HotfixCleanup, Action::Cleanup),
    edge(HotfixCleanup, HotfixComplete, Action::Finish),
];

/// The forward edges declared for a workflow type.
pub fn forward_edges(workflow: WorkflowType) -> &'static [Edge] {
    match workflow {
        WorkflowType::Standard => STANDARD_EDGES,
        WorkflowType::Hotfix => HOTFIX_EDGES,
    }
}

/// Every edge of the workflow's graph, forward edges first, then abort edges.
pub fn edges(workflow: WorkflowType) -> impl Iterator<Item = Edge> {
    let aborted = workflow.aborted_state();
    let aborts = WorkflowState::ALL
        .into_iter()
        .filter(move |s| s.workflow_type() == workflow && !s.is_terminal())
        .map(move |from| edge(from, aborted, Action::Abort));
    forward_edges(workflow).iter().copied().chain(aborts)
}
