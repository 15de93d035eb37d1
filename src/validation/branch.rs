//! Branch reuse detection.
//!
//! # Decision Policy
//!
//! Checked in this order:
//!
//! | History of the name | Verdict | Kind |
//! |---------------------|---------|------|
//! | An active session uses it | unavailable | `active-session` |
//! | A session merged under it | unavailable | `merged-and-recreated` |
//! | Only aborted or expired sessions used it | available | `continued-work` |
//! | Never used | available | none |
//!
//! The verdict is computed from a [`BranchHistory`] snapshot, so it depends on
//! nothing but stored session history and the date used for suggestions.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::name::suggest_alternatives;
use crate::persistence::{BranchIndex, BranchRecord, IntegrityError, SessionStore, StoreError};
use crate::types::{PrLink, Session, SessionId};

/// Why a branch name was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReuseKind {
    /// Another session is still working on the branch.
    ActiveSession,
    /// The name was retired by a merge.
    MergedAndRecreated,
    /// An earlier session was abandoned; picking the name up again is fine.
    ContinuedWork,
}

impl ReuseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReuseKind::ActiveSession => "active-session",
            ReuseKind::MergedAndRecreated => "merged-and-recreated",
            ReuseKind::ContinuedWork => "continued-work",
        }
    }
}

impl fmt::Display for ReuseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of [`BranchValidator::check_branch_name_availability`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchAvailability {
    pub branch: String,
    pub available: bool,
    /// `None` when the name was never used.
    pub kind: Option<ReuseKind>,
    /// The branch record of the most recent session on the name.
    pub previous_session: Option<BranchRecord>,
    /// Alternative names; only filled in when the name is unavailable.
    pub suggestions: Vec<String>,
}

impl BranchAvailability {
    /// Human-readable reason for the verdict.
    pub fn reason(&self) -> Option<String> {
        let kind = self.kind?;
        let previous = self
            .previous_session
            .as_ref()
            .map(|r| r.session_id.short())
            .unwrap_or_default();
        Some(match kind {
            ReuseKind::ActiveSession => format!(
                "branch '{}' already has an active session ({})",
                self.branch, previous
            ),
            ReuseKind::MergedAndRecreated => {
                let pr = self
                    .previous_session
                    .as_ref()
                    .and_then(|r| r.retirement())
                    .and_then(|r| r.pull_request)
                    .map(|pr| format!(" via {}", pr.number))
                    .unwrap_or_default();
                format!(
                    "branch '{}' was merged{} and cannot be reused",
                    self.branch, pr
                )
            }
            ReuseKind::ContinuedWork => format!(
                "branch '{}' was used by an unfinished session ({}); continuing that work",
                self.branch, previous
            ),
        })
    }
}

/// What [`BranchValidator::detect_branch_reuse`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseDetected {
    pub kind: ReuseKind,
    pub previous_pr: Option<PrLink>,
}

/// Verdict of [`BranchValidator::detect_branch_reuse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReuse {
    pub available: bool,
    pub reuse_detected: Option<ReuseDetected>,
}

/// Snapshot of everything the store knows about branch names.
#[derive(Debug, Clone, Default)]
pub struct BranchHistory {
    index: BranchIndex,
    active: BTreeMap<String, SessionId>,
}

impl BranchHistory {
    /// Reads the branch index and the set of active sessions.
    ///
    /// Fails with an integrity error if two active sessions share a branch.
    pub fn load(store: &SessionStore) -> Result<Self, StoreError> {
        let mut active: BTreeMap<String, SessionId> = BTreeMap::new();
        for session in store.list(false)? {
            if let Some(other) = active.insert(session.branch_name.clone(), session.id) {
                return Err(IntegrityError::DuplicateActiveSessions {
                    branch: session.branch_name,
                    sessions: vec![other, session.id],
                }
                .into());
            }
        }
        Ok(BranchHistory {
            index: store.read_index()?,
            active,
        })
    }

    /// Builds a history from sessions directly. `active` sessions are the ones
    /// still in progress.
    pub fn from_sessions<'a>(
        sessions: impl IntoIterator<Item = &'a Session>,
        is_active: impl Fn(&Session) -> bool,
    ) -> Self {
        let mut history = BranchHistory::default();
        for session in sessions {
            history.index.record(session);
            if is_active(session) {
                history
                    .active
                    .insert(session.branch_name.clone(), session.id);
            }
        }
        history
    }

    pub fn record(&self, branch: &str) -> Option<&BranchRecord> {
        self.index.branches.get(branch)
    }

    pub fn active_session(&self, branch: &str) -> Option<SessionId> {
        self.active.get(branch).copied()
    }

    /// Returns true if a new session could start on `branch`.
    pub fn is_free(&self, branch: &str) -> bool {
        !self.active.contains_key(branch) && !self.record(branch).is_some_and(|r| r.is_retired())
    }

    /// The availability verdict for `branch`, suggesting alternatives dated
    /// `today` when it is unavailable.
    pub fn availability(&self, branch: &str, today: NaiveDate) -> BranchAvailability {
        let previous_session = self.record(branch).cloned();
        let (available, kind) = if self.active.contains_key(branch) {
            (false, Some(ReuseKind::ActiveSession))
        } else {
            match &previous_session {
                Some(record) if record.is_retired() => {
                    (false, Some(ReuseKind::MergedAndRecreated))
                }
                Some(_) => (true, Some(ReuseKind::ContinuedWork)),
                None => (true, None),
            }
        };

        let suggestions = if available {
            Vec::new()
        } else {
            suggest_alternatives(branch, today, |c| self.is_free(c))
        };

        BranchAvailability {
            branch: branch.to_string(),
            available,
            kind,
            previous_session,
            suggestions,
        }
    }

    /// Whether `session` running on `branch` reuses a name it should not.
    pub fn reuse(&self, session: &Session, branch: &str) -> BranchReuse {
        let Some(record) = self.record(branch) else {
            return BranchReuse {
                available: true,
                reuse_detected: None,
            };
        };

        let detected = |kind, previous_pr| {
            Some(ReuseDetected { kind, previous_pr })
        };

        if let Some(active) = self.active_session(branch)
            && active != session.id
        {
            return BranchReuse {
                available: false,
                reuse_detected: detected(ReuseKind::ActiveSession, record.pull_request.clone()),
            };
        }

        let retirement = if record.session_id == session.id {
            record.retired_by.clone()
        } else {
            record.retirement()
        };
        if let Some(retirement) = retirement {
            return BranchReuse {
                available: false,
                reuse_detected: detected(ReuseKind::MergedAndRecreated, retirement.pull_request),
            };
        }

        if record.session_id == session.id {
            BranchReuse {
                available: true,
                reuse_detected: None,
            }
        } else {
            BranchReuse {
                available: true,
                reuse_detected: detected(ReuseKind::ContinuedWork, record.pull_request.clone()),
            }
        }
    }
}

/// Branch-name availability checks against a session store.
#[derive(Debug, Clone, Copy)]
pub struct BranchValidator<'a> {
    store: &'a SessionStore,
}

impl<'a> BranchValidator<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        BranchValidator { store }
    }

    /// Decides whether a new session may start on `name`.
    pub fn check_branch_name_availability(
        &self,
        name: &str,
    ) -> Result<BranchAvailability, StoreError> {
        let verdict = BranchHistory::load(self.store)?.availability(name, Utc::now().date_naive());
        tracing::debug!(
            branch = name,
            available = verdict.available,
            kind = ?verdict.kind,
            "branch availability"
        );
        Ok(verdict)
    }

    /// Decides whether `session` may keep using `branch`.
    pub fn detect_branch_reuse(
        &self,
        session: &Session,
        branch: &str,
    ) -> Result<BranchReuse, StoreError> {
        Ok(BranchHistory::load(self.store)?.reuse(session, branch))
    }
}
