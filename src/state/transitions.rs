//! Validated state transitions.
//!
//! Pure functions over the workflow graphs in [`super::graph`]. No I/O: callers
//! persist the session themselves after a successful transition.

use chrono::Utc;
use thiserror::Error;

use super::graph::{self, Edge};
use crate::types::{Action, Extra, Session, TransitionRecord, WorkflowState, WorkflowType};

/// Error returned when a transition is rejected. The session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The edge is not part of the workflow's graph.
    #[error("illegal transition {from} -> {to} in {workflow} workflow")]
    IllegalTransition {
        workflow: WorkflowType,
        from: WorkflowState,
        to: WorkflowState,
    },

    /// A machine for one workflow type was asked to move a session of another.
    #[error("{machine} state machine cannot drive a {session} session")]
    WorkflowMismatch {
        machine: WorkflowType,
        session: WorkflowType,
    },

    /// The session's current state does not belong to its workflow type.
    #[error("session state {state} is not a {workflow} workflow state")]
    CorruptState {
        workflow: WorkflowType,
        state: WorkflowState,
    },
}

impl TransitionError {
    /// Returns true if the error indicates corrupted session data rather than
    /// an illegal request.
    pub fn is_integrity(&self) -> bool {
        matches!(self, TransitionError::CorruptState { .. })
    }
}

/// The state machine for one workflow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMachine {
    workflow: WorkflowType,
}

impl StateMachine {
    pub fn new(workflow: WorkflowType) -> Self {
        StateMachine { workflow }
    }

    /// The machine that governs the given session.
    pub fn for_session(session: &Session) -> Self {
        StateMachine::new(session.workflow_type)
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.workflow
    }

    pub fn initial_state(&self) -> WorkflowState {
        self.workflow.initial_state()
    }

    /// Returns true if `state` belongs to this workflow.
    pub fn contains(&self, state: WorkflowState) -> bool {
        state.workflow_type() == self.workflow
    }

    /// All edges of this workflow's graph.
    pub fn edges(&self) -> impl Iterator<Item = Edge> {
        graph::edges(self.workflow)
    }

    /// Returns true if `from -> to` is an edge of this workflow's graph.
    pub fn can_transition(&self, from: WorkflowState, to: WorkflowState) -> bool {
        self.edge(from, to).is_some()
    }

    /// The action labelling `from -> to`, if that edge exists.
    pub fn action_for(&self, from: WorkflowState, to: WorkflowState) -> Option<Action> {
        self.edge(from, to).map(|e| e.action)
    }

    /// Actions available from `state`, in graph order. Empty for terminal states.
    pub fn allowed_actions(&self, state: WorkflowState) -> Vec<Action> {
        let mut actions: Vec<Action> = Vec::new();
        for e in self.edges().filter(|e| e.from == state) {
            if !actions.contains(&e.action) {
                actions.push(e.action);
            }
        }
        actions
    }

    /// States reachable from `state` in one step.
    pub fn allowed_targets(&self, state: WorkflowState) -> Vec<WorkflowState> {
        self.edges()
            .filter(|e| e.from == state)
            .map(|e| e.to)
            .collect()
    }

    /// The target reached from `state` by `action`, if any.
    pub fn target_for(&self, state: WorkflowState, action: Action) -> Option<WorkflowState> {
        self.edges()
            .find(|e| e.from == state && e.action == action)
            .map(|e| e.to)
    }

    /// Returns true if `state` has no outgoing edges.
    pub fn is_final_state(&self, state: WorkflowState) -> bool {
        self.contains(state) && state.is_terminal()
    }

    /// Moves `session` to `to`, appending a history record.
    ///
    /// On error the session is not modified. Re-requesting the transition that
    /// was just applied is an error (there are no self-loops).
    pub fn transition(
        &self,
        session: &mut Session,
        to: WorkflowState,
        trigger: &str,
        metadata: Extra,
    ) -> Result<TransitionRecord, TransitionError> {
        if session.workflow_type != self.workflow {
            return Err(TransitionError::WorkflowMismatch {
                machine: self.workflow,
                session: session.workflow_type,
            });
        }

        let from = session.current_state();
        if !self.contains(from) {
            return Err(TransitionError::CorruptState {
                workflow: self.workflow,
                state: from,
            });
        }

        if !self.can_transition(from, to) {
            return Err(TransitionError::IllegalTransition {
                workflow: self.workflow,
                from,
                to,
            });
        }

        let record = TransitionRecord {
            from,
            to,
            trigger: trigger.to_string(),
            timestamp: Utc::now(),
            metadata,
        };
        session.apply(record.clone());

        tracing::debug!(
            session = %session.id,
            branch = %session.branch_name,
            %from,
            %to,
            trigger,
            "state transition"
        );

        Ok(record)
    }

    fn edge(&self, from: WorkflowState, to: WorkflowState) -> Option<Edge> {
        self.edges().find(|e| e.from == from && e.to == to)
    }
}

/// Applies `action` to the session, resolving the target from the graph.
///
/// Convenience for orchestrators that think in actions rather than states.
pub fn apply_action(
    session: &mut Session,
    action: Action,
    trigger: &str,
    metadata: Extra,
) -> Result<TransitionRecord, TransitionError> {
    let machine = StateMachine::for_session(session);
    let from = session.current_state();
    match machine.target_for(from, action) {
        Some(to) => machine.transition(session, to, trigger, metadata),
        None => Err(TransitionError::IllegalTransition {
            workflow: machine.workflow_type(),
            from,
            to: from,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_state, arb_workflow_type, new_session, session_in_state};
    use chrono::Duration;
    use proptest::prelude::*;
    use WorkflowState::*;

    fn standard() -> StateMachine {
        StateMachine::new(WorkflowType::Standard)
    }

    fn hotfix() -> StateMachine {
        StateMachine::new(WorkflowType::Hotfix)
    }

    // ─── Unit Tests ───────────────────────────────────────────────────────────

    #[test]
    fn happy_path_standard() {
        let m = standard();
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        for to in [
            BranchReady,
            ChangesCommitted,
            Pushed,
            PrCreated,
            WaitingApproval,
            Rebasing,
            Merging,
            Cleanup,
            Complete,
        ] {
            m.transition(&mut s, to, "test", Extra::new()).unwrap();
        }
        assert_eq!(s.current_state(), Complete);
        assert_eq!(s.state_history().len(), 9);
        assert!(s.is_terminal());
    }

    #[test]
    fn happy_path_hotfix_direct() {
        let m = hotfix();
        let mut s = new_session(WorkflowType::Hotfix, "hotfix/a", Duration::hours(1));
        for to in [
            HotfixBranchReady,
            HotfixCommitted,
            HotfixPushed,
            HotfixMerging,
            HotfixCleanup,
            HotfixComplete,
        ] {
            m.transition(&mut s, to, "test", Extra::new()).unwrap();
        }
        assert_eq!(s.current_state(), HotfixComplete);
    }

    #[test]
    fn init_to_complete_is_rejected_and_named() {
        let m = standard();
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        let err = m
            .transition(&mut s, Complete, "ship", Extra::new())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::IllegalTransition {
                workflow: WorkflowType::Standard,
                from: Init,
                to: Complete,
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("INIT"), "{msg}");
        assert!(msg.contains("COMPLETE"), "{msg}");
        assert_eq!(s.current_state(), Init);
        assert!(s.state_history().is_empty());
    }

    #[test]
    fn repeating_a_transition_is_an_error() {
        let m = standard();
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        m.transition(&mut s, BranchReady, "launch", Extra::new())
            .unwrap();
        let err = m
            .transition(&mut s, BranchReady, "launch", Extra::new())
            .unwrap_err();
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));
        assert_eq!(s.state_history().len(), 1);
    }

    #[test]
    fn abort_reachable_from_every_non_terminal_state() {
        for workflow in [WorkflowType::Standard, WorkflowType::Hotfix] {
            let m = StateMachine::new(workflow);
            for state in WorkflowState::ALL.into_iter().filter(|s| m.contains(*s)) {
                let expected = !state.is_terminal();
                assert_eq!(
                    m.can_transition(state, workflow.aborted_state()),
                    expected,
                    "{state}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_allow_nothing() {
        let m = standard();
        assert!(m.allowed_actions(Complete).is_empty());
        assert!(m.allowed_actions(Aborted).is_empty());
        assert!(m.is_final_state(Complete));
        assert!(m.is_final_state(Aborted));
        assert!(!m.is_final_state(Merging));
    }

    #[test]
    fn final_state_of_other_workflow_is_not_final_here() {
        assert!(!standard().is_final_state(HotfixComplete));
        assert!(hotfix().is_final_state(HotfixComplete));
    }

    #[test]
    fn allowed_actions_follow_graph_order() {
        let m = standard();
        assert_eq!(
            m.allowed_actions(Init),
            vec![Action::CreateBranch, Action::Abort]
        );
        assert_eq!(
            m.allowed_actions(PrCreated),
            vec![
                Action::AwaitApproval,
                Action::Rebase,
                Action::Commit,
                Action::Abort
            ]
        );
    }

    #[test]
    fn standard_forbids_direct_merge_hotfix_permits_it() {
        assert!(!standard().can_transition(Pushed, Merging));
        assert!(hotfix().can_transition(HotfixPushed, HotfixMerging));
        assert_eq!(
            hotfix().action_for(HotfixPushed, HotfixMerging),
            Some(Action::MergeDirect)
        );
    }

    #[test]
    fn cross_workflow_edges_are_rejected() {
        assert!(!standard().can_transition(Init, HotfixBranchReady));
        assert!(!hotfix().can_transition(HotfixInit, BranchReady));
    }

    #[test]
    fn wrong_machine_is_rejected() {
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        let err = hotfix()
            .transition(&mut s, HotfixBranchReady, "x", Extra::new())
            .unwrap_err();
        assert!(matches!(err, TransitionError::WorkflowMismatch { .. }));
    }

    #[test]
    fn corrupt_state_is_an_integrity_error() {
        let json = serde_json::json!({
            "id": "6f1c2b1e-7c7b-4d0f-9b3c-1c9a4a1d2e3f",
            "workflow_type": "standard",
            "branch_name": "feature/a",
            "current_state": "HOTFIX_PUSHED",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
            "expires_at": "2026-01-02T00:00:00Z",
        });
        let mut s: Session = serde_json::from_value(json).unwrap();
        let err = standard()
            .transition(&mut s, Aborted, "abort", Extra::new())
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn transition_records_trigger_and_metadata() {
        let m = standard();
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        let mut meta = Extra::new();
        meta.insert("base".to_string(), serde_json::json!("main"));
        let record = m
            .transition(&mut s, BranchReady, "launch", meta.clone())
            .unwrap();
        assert_eq!(record.from, Init);
        assert_eq!(record.to, BranchReady);
        assert_eq!(record.trigger, "launch");
        assert_eq!(record.metadata, meta);
        assert_eq!(s.last_transition(), Some(&record));
        assert_eq!(s.updated_at, record.timestamp);
    }

    #[test]
    fn transition_does_not_refresh_expiry() {
        let m = standard();
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        let expires = s.expires_at;
        m.transition(&mut s, BranchReady, "launch", Extra::new())
            .unwrap();
        assert_eq!(s.expires_at, expires);
    }

    #[test]
    fn apply_action_resolves_target() {
        let mut s = new_session(WorkflowType::Standard, "feature/a", Duration::hours(1));
        let record = apply_action(&mut s, Action::CreateBranch, "launch", Extra::new()).unwrap();
        assert_eq!(record.to, BranchReady);
        let err = apply_action(&mut s, Action::Merge, "ship", Extra::new()).unwrap_err();
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));
    }

    // ─── Property Tests ───────────────────────────────────────────────────────

    proptest! {
        /// Rejected transitions leave state and history untouched.
        #[test]
        fn illegal_edges_never_mutate(from in arb_state(), to in arb_state()) {
            let workflow = from.workflow_type();
            let m = StateMachine::new(workflow);
            let mut s = session_in_state(from);
            let before = s.clone();

            match m.transition(&mut s, to, "prop", Extra::new()) {
                Ok(_) => {
                    prop_assert!(m.can_transition(from, to));
                    prop_assert_eq!(s.current_state(), to);
                }
                Err(_) => {
                    prop_assert!(!m.can_transition(from, to));
                    prop_assert_eq!(s, before);
                }
            }
        }

        /// History only grows, and earlier entries are never altered.
        #[test]
        fn history_is_append_only(targets in proptest::collection::vec(arb_state(), 0..30)) {
            let m = standard();
            let mut s = new_session(WorkflowType::Standard, "feature/p", Duration::hours(1));
            for to in targets {
                let before = s.state_history().to_vec();
                let _ = m.transition(&mut s, to, "prop", Extra::new());
                let after = s.state_history();
                prop_assert!(after.len() >= before.len());
                prop_assert!(after.len() <= before.len() + 1);
                prop_assert_eq!(&after[..before.len()], &before[..]);
            }
        }

        /// Every recorded entry is an edge of the graph, and entries chain.
        #[test]
        fn history_is_a_walk_of_the_graph(targets in proptest::collection::vec(arb_state(), 0..30)) {
            let m = hotfix();
            let mut s = new_session(WorkflowType::Hotfix, "hotfix/p", Duration::hours(1));
            for to in targets {
                let _ = m.transition(&mut s, to, "prop", Extra::new());
            }
            let mut expected_from = m.initial_state();
            for record in s.state_history() {
                prop_assert_eq!(record.from, expected_from);
                prop_assert!(m.can_transition(record.from, record.to));
                expected_from = record.to;
            }
            prop_assert_eq!(s.current_state(), expected_from);
        }

        /// Every one-step target is reachable by exactly the action that
        /// `allowed_actions` offers for it.
        #[test]
        fn targets_and_actions_agree(workflow in arb_workflow_type(), from in arb_state()) {
            let m = StateMachine::new(workflow);
            let targets = m.allowed_targets(from);
            for &to in &targets {
                prop_assert!(m.can_transition(from, to));
                let action = m.action_for(from, to);
                prop_assert!(action.is_some());
                prop_assert_eq!(action.and_then(|a| m.target_for(from, a)), Some(to));
            }
            prop_assert_eq!(targets.is_empty(), m.allowed_actions(from).is_empty());
        }
    }
}
