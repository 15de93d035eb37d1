//! The session entity: one workflow's progress, scoped to one branch.
//!
//! `current_state` and `state_history` are private. The only way to change them
//! is [`StateMachine::transition`](crate::state::StateMachine::transition), which
//! validates the edge before appending to the history.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::SessionId;
use super::pr::PrLink;
use super::workflow::{WorkflowState, WorkflowType};

/// Open extension values attached to sessions and transitions.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// Hotfix severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing a [`Severity`] fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}' (expected low, medium, high or critical)")]
pub struct InvalidSeverity(pub String);

impl FromStr for Severity {
    type Err = InvalidSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(InvalidSeverity(s.to_string())),
        }
    }
}

/// Session metadata.
///
/// Known keys are typed fields; anything else lands in `extra` and round-trips
/// untouched through persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Working copy the session was started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,

    /// URL of the remote the branch is pushed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// Code-hosting platform name (e.g. "github").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Branch the session's branch was created from and merges back into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,

    /// The pull request opened for this session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PrLink>,

    /// Hotfix severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Why the session was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,

    /// Unrecognised keys.
    #[serde(flatten)]
    pub extra: Extra,
}

/// One applied state transition. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    /// What caused the transition (usually the command name).
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Extra,
}

/// A workflow session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub workflow_type: WorkflowType,
    pub branch_name: String,
    current_state: WorkflowState,
    #[serde(default)]
    state_history: Vec<TransitionRecord>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fixed at creation; activity does not extend it.
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<Uuid>,
}

impl Session {
    /// Creates a session in its workflow's initial state.
    pub fn new(
        workflow_type: WorkflowType,
        branch_name: impl Into<String>,
        metadata: SessionMetadata,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Session {
            id: SessionId::generate(),
            workflow_type,
            branch_name: branch_name.into(),
            current_state: workflow_type.initial_state(),
            state_history: Vec::new(),
            metadata,
            created_at: now,
            updated_at: now,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            lock_id: None,
        }
    }

    /// The state the session is currently in.
    pub fn current_state(&self) -> WorkflowState {
        self.current_state
    }

    /// All applied transitions, oldest first.
    pub fn state_history(&self) -> &[TransitionRecord] {
        &self.state_history
    }

    /// The most recent transition, if any.
    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.state_history.last()
    }

    /// Returns true once the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Returns true if `expires_at` is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active means non-terminal and not yet expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && !self.is_expired_at(now)
    }

    /// [`is_active_at`](Self::is_active_at) evaluated now.
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Returns true if an operation currently holds this session's lock.
    pub fn is_locked(&self) -> bool {
        self.lock_id.is_some()
    }

    /// Returns true if the linked pull request has been merged.
    pub fn is_merged(&self) -> bool {
        self.metadata
            .pull_request
            .as_ref()
            .is_some_and(|pr| pr.merged)
    }

    /// The base branch recorded at launch, or `default` if none was recorded.
    pub fn base_branch_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.metadata.base_branch.as_deref().unwrap_or(default)
    }

    /// Returns true if the current state belongs to the session's workflow type.
    pub fn state_matches_workflow(&self) -> bool {
        self.current_state.workflow_type() == self.workflow_type
    }

    pub(crate) fn apply(&mut self, record: TransitionRecord) {
        self.current_state = record.to;
        self.updated_at = record.timestamp;
        self.state_history.push(record);
    }
}
