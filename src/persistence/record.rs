//! On-disk record formats.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   sessions/<id>.json   # one SessionRecord per session
//!   locks/<id>.lock      # present while a session is claimed (LockInfo)
//!   branches.json        # BranchIndex: most recent session per branch name
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{PrLink, Session, SessionId, WorkflowState, WorkflowType};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// A persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub schema_version: u32,
    pub session: Session,
}

impl SessionRecord {
    pub fn new(session: Session) -> Self {
        SessionRecord {
            schema_version: SCHEMA_VERSION,
            session,
        }
    }
}

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub lock_id: Uuid,
    pub session_id: SessionId,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// How the most recent session on a branch ended (or that it has not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchOutcome {
    /// The session is still running.
    Active,
    /// The session's work reached the base branch.
    Merged,
    /// The session was aborted before merging.
    Aborted,
    /// The session expired and was garbage-collected before finishing.
    Expired,
}

impl BranchOutcome {
    /// Classifies a session by its current state and PR linkage.
    ///
    /// Reaching the cleanup phase implies the merge already happened, which
    /// also covers direct hotfix merges that have no PR.
    pub fn of(session: &Session) -> Self {
        let state = session.current_state();
        let merged_phase = matches!(
            state,
            WorkflowState::Cleanup
                | WorkflowState::Complete
                | WorkflowState::HotfixCleanup
                | WorkflowState::HotfixComplete
        );
        if session.is_merged() || merged_phase {
            BranchOutcome::Merged
        } else if state.is_aborted() {
            BranchOutcome::Aborted
        } else {
            BranchOutcome::Active
        }
    }
}

/// The branch reuse record: what happened to the last session on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub branch: String,
    pub session_id: SessionId,
    pub workflow_type: WorkflowType,
    pub outcome: BranchOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PrLink>,
    pub session_created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// An earlier session that merged under this name, if a later session
    /// replaced the entry anyway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired_by: Option<MergeRetirement>,
}

/// A merged session that retired a branch name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRetirement {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PrLink>,
    pub retired_at: DateTime<Utc>,
}

impl BranchRecord {
    /// Builds a record describing `session` as of now.
    pub fn from_session(session: &Session) -> Self {
        BranchRecord {
            branch: session.branch_name.clone(),
            session_id: session.id,
            workflow_type: session.workflow_type,
            outcome: BranchOutcome::of(session),
            pull_request: session.metadata.pull_request.clone(),
            session_created_at: session.created_at,
            updated_at: Utc::now(),
            retired_by: None,
        }
    }

    /// Returns true if this record's own session merged.
    pub fn is_merged(&self) -> bool {
        self.outcome == BranchOutcome::Merged
    }

    /// Returns true if any session ever merged under this name.
    pub fn is_retired(&self) -> bool {
        self.is_merged() || self.retired_by.is_some()
    }

    /// The merge that retired the name, preferring the earliest one.
    pub fn retirement(&self) -> Option<MergeRetirement> {
        self.retired_by.clone().or_else(|| {
            self.is_merged().then(|| MergeRetirement {
                session_id: self.session_id,
                pull_request: self.pull_request.clone(),
                retired_at: self.updated_at,
            })
        })
    }
}

/// The branch index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchIndex {
    pub schema_version: u32,
    #[serde(default)]
    pub branches: BTreeMap<String, BranchRecord>,
}

impl Default for BranchIndex {
    fn default() -> Self {
        BranchIndex {
            schema_version: SCHEMA_VERSION,
            branches: BTreeMap::new(),
        }
    }
}

impl BranchIndex {
    /// Records `session` as the latest on its branch unless a newer session
    /// already owns the entry. Returns whether the index changed.
    ///
    /// A merge retirement is never lost: it is carried into whichever entry
    /// ends up owning the name.
    pub fn record(&mut self, session: &Session) -> bool {
        let mut incoming = BranchRecord::from_session(session);
        let Some(existing) = self.branches.get_mut(&session.branch_name) else {
            self.branches.insert(session.branch_name.clone(), incoming);
            return true;
        };

        if existing.session_id != session.id
            && existing.session_created_at > session.created_at
        {
            // Older session: only a merge it made still matters.
            if existing.retired_by.is_none()
                && let Some(retirement) = incoming.retirement()
            {
                existing.retired_by = Some(retirement);
                return true;
            }
            return false;
        }

        if existing.session_id == incoming.session_id
            && existing.outcome == incoming.outcome
            && existing.pull_request == incoming.pull_request
        {
            return false;
        }

        incoming.retired_by = if existing.session_id == incoming.session_id {
            existing.retired_by.clone()
        } else {
            existing.retirement()
        };
        *existing = incoming;
        true
    }

    /// Marks the entry for `session` as expired, if it still refers to it and
    /// the session never finished.
    pub fn mark_expired(&mut self, session: &Session) -> bool {
        match self.branches.get_mut(&session.branch_name) {
            Some(entry)
                if entry.session_id == session.id && entry.outcome == BranchOutcome::Active =>
            {
                entry.outcome = BranchOutcome::Expired;
                entry.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateMachine;
    use crate::test_utils::{new_session, session_in_state};
    use crate::types::{Extra, PrNumber};
    use chrono::Duration;

    #[test]
    fn outcome_of_fresh_session_is_active() {
        let s = new_session(WorkflowType::Standard, "a", Duration::hours(1));
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Active);
    }

    #[test]
    fn outcome_of_aborted_session() {
        let s = session_in_state(WorkflowState::Aborted);
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Aborted);
    }

    #[test]
    fn outcome_of_completed_session_is_merged() {
        let s = session_in_state(WorkflowState::Complete);
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Merged);
        let s = session_in_state(WorkflowState::HotfixComplete);
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Merged);
    }

    #[test]
    fn outcome_follows_pr_merge_flag() {
        let mut s = session_in_state(WorkflowState::Merging);
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Active);
        s.metadata.pull_request = Some(PrLink {
            number: PrNumber(1),
            url: "u".to_string(),
            merged: true,
            merged_at: Some(Utc::now()),
        });
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Merged);
    }

    #[test]
    fn aborted_after_merge_still_counts_as_merged() {
        let mut s = session_in_state(WorkflowState::Merging);
        s.metadata.pull_request = Some(PrLink {
            number: PrNumber(1),
            url: "u".to_string(),
            merged: true,
            merged_at: Some(Utc::now()),
        });
        StateMachine::for_session(&s)
            .transition(&mut s, WorkflowState::Aborted, "abort", Extra::new())
            .unwrap();
        assert_eq!(BranchOutcome::of(&s), BranchOutcome::Merged);
    }

    #[test]
    fn newer_session_wins_index_entry() {
        let mut index = BranchIndex::default();
        let old = new_session(WorkflowType::Standard, "a", Duration::hours(1));
        let mut newer = new_session(WorkflowType::Standard, "a", Duration::hours(1));
        newer.created_at = old.created_at + Duration::seconds(5);

        assert!(index.record(&newer));
        assert!(!index.record(&old));
        assert_eq!(index.branches["a"].session_id, newer.id);
    }

    #[test]
    fn record_is_noop_when_unchanged() {
        let mut index = BranchIndex::default();
        let s = new_session(WorkflowType::Standard, "a", Duration::hours(1));
        assert!(index.record(&s));
        assert!(!index.record(&s));
    }

    #[test]
    fn replacing_merged_entry_keeps_retirement() {
        let mut index = BranchIndex::default();
        let merged = session_in_state(WorkflowState::Complete);
        let mut again = new_session(WorkflowType::Standard, &merged.branch_name, Duration::hours(1));
        again.created_at = merged.created_at + Duration::seconds(5);

        index.record(&merged);
        assert!(index.record(&again));
        let entry = &index.branches[&merged.branch_name];
        assert_eq!(entry.session_id, again.id);
        assert!(!entry.is_merged());
        assert!(entry.is_retired());
        assert_eq!(entry.retirement().unwrap().session_id, merged.id);
    }

    #[test]
    fn older_merged_session_still_retires_name() {
        let mut index = BranchIndex::default();
        let merged = session_in_state(WorkflowState::Complete);
        let mut newer = new_session(WorkflowType::Standard, &merged.branch_name, Duration::hours(1));
        newer.created_at = merged.created_at + Duration::seconds(5);

        index.record(&newer);
        assert!(index.record(&merged));
        let entry = &index.branches[&merged.branch_name];
        assert_eq!(entry.session_id, newer.id);
        assert!(entry.is_retired());
    }

    #[test]
    fn replacing_aborted_entry_is_not_retired() {
        let mut index = BranchIndex::default();
        let aborted = session_in_state(WorkflowState::Aborted);
        let mut again = new_session(WorkflowType::Standard, &aborted.branch_name, Duration::hours(1));
        again.created_at = aborted.created_at + Duration::seconds(5);

        index.record(&aborted);
        index.record(&again);
        assert!(!index.branches[&aborted.branch_name].is_retired());
    }

    #[test]
    fn mark_expired_only_touches_active_entry_of_same_session() {
        let mut index = BranchIndex::default();
        let s = new_session(WorkflowType::Standard, "a", Duration::hours(1));
        let other = new_session(WorkflowType::Standard, "a", Duration::hours(1));
        index.record(&s);
        assert!(!index.mark_expired(&other));
        assert!(index.mark_expired(&s));
        assert_eq!(index.branches["a"].outcome, BranchOutcome::Expired);
        assert!(!index.mark_expired(&s));
    }
}
