//! The session store.
//!
//! Sessions are persisted one file per session. A branch index keeps the most
//! recent outcome per branch name so that reuse detection keeps working after
//! sessions are deleted or garbage-collected.
//!
//! The session files are the source of truth for "is there an active session on
//! this branch": [`SessionStore::get_by_branch`] scans them and reports an
//! integrity error if it finds more than one.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::atomic::{AtomicWriteError, read_json, remove_if_exists, write_json_atomic};
use super::record::{BranchIndex, BranchRecord, SCHEMA_VERSION, SessionRecord};
use crate::state::StateMachine;
use crate::types::{Session, SessionId, SessionMetadata, WorkflowState, WorkflowType};

/// Persisted state that contradicts the store's invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// More than one active session claims the same branch.
    #[error("branch '{branch}' has {} active sessions: {}", sessions.len(), format_ids(sessions))]
    DuplicateActiveSessions {
        branch: String,
        sessions: Vec<SessionId>,
    },

    /// A session's current state is not part of its workflow's graph.
    #[error("session {session} is in state {state}, which is not a {workflow} workflow state")]
    IllegalState {
        session: SessionId,
        workflow: WorkflowType,
        state: WorkflowState,
    },

    /// The recorded history is not a walk of the workflow graph ending in the
    /// current state.
    #[error("session {session}: history entry {index} ({from} -> {to}) is not a legal step")]
    BrokenHistory {
        session: SessionId,
        index: usize,
        from: WorkflowState,
        to: WorkflowState,
    },

    /// An update would drop or alter already-recorded history.
    #[error("session {session}: update would rewrite recorded state history")]
    HistoryRewritten { session: SessionId },

    /// An update would move the session to another branch.
    #[error("session {session}: branch cannot change from '{stored}' to '{requested}'")]
    BranchChanged {
        session: SessionId,
        stored: String,
        requested: String,
    },

    /// A session file holds a different session than its name says.
    #[error("session file {path} holds session {found}")]
    IdMismatch { path: PathBuf, found: SessionId },
}

fn format_ids(ids: &[SessionId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch in {path}: expected {expected}, got {got}")]
    SchemaMismatch {
        path: PathBuf,
        expected: u32,
        got: u32,
    },

    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("branch '{branch}' already has an active session ({session})")]
    BranchInUse { branch: String, session: SessionId },

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("session ttl of {hours} hours is outside 0..={}", MAX_SESSION_TTL_HOURS)]
    InvalidTtl { hours: i64 },
}

impl From<AtomicWriteError> for StoreError {
    fn from(e: AtomicWriteError) -> Self {
        match e {
            AtomicWriteError::Io(e) => StoreError::Io(e),
            AtomicWriteError::Json(e) => StoreError::Json(e),
        }
    }
}

/// Longest session lifetime a store accepts: ten years.
pub const MAX_SESSION_TTL_HOURS: u32 = 24 * 365 * 10;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    /// Opens (creating if needed) a store rooted at `root`. New sessions expire
    /// `ttl` after creation.
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        if ttl < Duration::zero() || ttl > Duration::hours(i64::from(MAX_SESSION_TTL_HOURS)) {
            return Err(StoreError::InvalidTtl {
                hours: ttl.num_hours(),
            });
        }
        let store = SessionStore {
            root: root.into(),
            ttl,
        };
        std::fs::create_dir_all(store.sessions_dir())?;
        std::fs::create_dir_all(store.locks_dir())?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub(crate) fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub(crate) fn session_path(&self, id: SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", id))
    }

    pub(crate) fn lock_path(&self, id: SessionId) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", id))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("branches.json")
    }

    // ─── CRUD ─────────────────────────────────────────────────────────────────

    /// Creates a session in its workflow's initial state.
    ///
    /// Fails with [`StoreError::BranchInUse`] if the branch already has an
    /// active session.
    pub fn create(
        &self,
        workflow_type: WorkflowType,
        branch_name: &str,
        metadata: SessionMetadata,
    ) -> Result<Session> {
        if let Some(existing) = self.get_by_branch(branch_name)? {
            return Err(StoreError::BranchInUse {
                branch: branch_name.to_string(),
                session: existing.id,
            });
        }

        let session = Session::new(workflow_type, branch_name, metadata, self.ttl, Utc::now());
        self.write_session(&session)?;
        self.record_branch(&session)?;

        tracing::info!(
            session = %session.id,
            branch = %session.branch_name,
            workflow = %session.workflow_type,
            expires_at = %session.expires_at,
            "session created"
        );
        Ok(session)
    }

    /// Loads a session by id.
    pub fn get(&self, id: SessionId) -> Result<Option<Session>> {
        self.read_session(&self.session_path(id))
    }

    /// Loads a session by id, failing with [`StoreError::NotFound`] if absent.
    pub fn require(&self, id: SessionId) -> Result<Session> {
        self.get(id)?.ok_or(StoreError::NotFound(id))
    }

    /// The active session on `branch_name`, if any.
    pub fn get_by_branch(&self, branch_name: &str) -> Result<Option<Session>> {
        self.get_by_branch_at(branch_name, Utc::now())
    }

    /// [`get_by_branch`](Self::get_by_branch) evaluated at `now`.
    pub fn get_by_branch_at(
        &self,
        branch_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let mut matches: Vec<Session> = self
            .load_all()?
            .into_iter()
            .filter(|s| s.branch_name == branch_name && s.is_active_at(now))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                let sessions = matches.iter().map(|s| s.id).collect();
                tracing::error!(branch = branch_name, "multiple active sessions on branch");
                Err(IntegrityError::DuplicateActiveSessions {
                    branch: branch_name.to_string(),
                    sessions,
                }
                .into())
            }
        }
    }

    /// Persists changes to an existing session.
    ///
    /// The store owns `lock_id`, `created_at` and `expires_at`: the persisted
    /// values are kept whatever the caller's copy says. The caller's history
    /// must extend the persisted history. Returns the session as written.
    pub fn update(&self, session: &Session) -> Result<Session> {
        let stored = self.require(session.id)?;

        if stored.branch_name != session.branch_name {
            return Err(IntegrityError::BranchChanged {
                session: session.id,
                stored: stored.branch_name,
                requested: session.branch_name.clone(),
            }
            .into());
        }
        check_state(session)?;

        let old = stored.state_history();
        let new = session.state_history();
        if new.len() < old.len() || new[..old.len()] != *old {
            return Err(IntegrityError::HistoryRewritten {
                session: session.id,
            }
            .into());
        }

        let mut updated = session.clone();
        updated.lock_id = stored.lock_id;
        updated.created_at = stored.created_at;
        updated.expires_at = stored.expires_at;
        updated.updated_at = Utc::now();

        self.write_session(&updated)?;
        self.record_branch(&updated)?;

        tracing::debug!(
            session = %updated.id,
            state = %updated.current_state(),
            "session updated"
        );
        Ok(updated)
    }

    /// Removes a session and any lock it holds. Returns whether it existed.
    ///
    /// The branch index entry is kept so reuse detection still sees it.
    pub fn delete(&self, id: SessionId) -> Result<bool> {
        let existed = remove_if_exists(&self.session_path(id))?;
        remove_if_exists(&self.lock_path(id))?;
        if existed {
            tracing::info!(session = %id, "session deleted");
        }
        Ok(existed)
    }

    /// Lists sessions, oldest first. Without `include_inactive`, only active
    /// sessions are returned.
    pub fn list(&self, include_inactive: bool) -> Result<Vec<Session>> {
        let now = Utc::now();
        let mut sessions: Vec<Session> = self
            .load_all()?
            .into_iter()
            .filter(|s| include_inactive || s.is_active_at(now))
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    // ─── Branch index ─────────────────────────────────────────────────────────

    /// The reuse record for `branch_name`, if the name was ever used.
    pub fn branch_record(&self, branch_name: &str) -> Result<Option<BranchRecord>> {
        Ok(self.read_index()?.branches.remove(branch_name))
    }

    /// Every branch the store has seen.
    pub fn branch_records(&self) -> Result<Vec<BranchRecord>> {
        Ok(self.read_index()?.branches.into_values().collect())
    }

    pub(crate) fn read_index(&self) -> Result<BranchIndex> {
        let path = self.index_path();
        let index: BranchIndex = read_json(&path)?.unwrap_or_default();
        if index.schema_version != SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                path,
                expected: SCHEMA_VERSION,
                got: index.schema_version,
            });
        }
        Ok(index)
    }

    pub(crate) fn write_index(&self, index: &BranchIndex) -> Result<()> {
        write_json_atomic(&self.index_path(), index)?;
        Ok(())
    }

    fn record_branch(&self, session: &Session) -> Result<()> {
        let mut index = self.read_index()?;
        if index.record(session) {
            self.write_index(&index)?;
        }
        Ok(())
    }

    // ─── Files ────────────────────────────────────────────────────────────────

    pub(crate) fn write_session(&self, session: &Session) -> Result<()> {
        write_json_atomic(
            &self.session_path(session.id),
            &SessionRecord::new(session.clone()),
        )?;
        Ok(())
    }

    fn read_session(&self, path: &Path) -> Result<Option<Session>> {
        let Some(record) = read_json::<SessionRecord>(path)? else {
            return Ok(None);
        };
        if record.schema_version != SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                path: path.to_path_buf(),
                expected: SCHEMA_VERSION,
                got: record.schema_version,
            });
        }

        let session = record.session;
        let expected_name = format!("{}.json", session.id);
        if path.file_name().and_then(|n| n.to_str()) != Some(expected_name.as_str()) {
            return Err(IntegrityError::IdMismatch {
                path: path.to_path_buf(),
                found: session.id,
            }
            .into());
        }
        check_state(&session)?;
        Ok(Some(session))
    }

    pub(crate) fn load_all(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(self.sessions_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = self.read_session(&path)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}

fn check_state(session: &Session) -> std::result::Result<(), IntegrityError> {
    if !session.state_matches_workflow() {
        return Err(IntegrityError::IllegalState {
            session: session.id,
            workflow: session.workflow_type,
            state: session.current_state(),
        });
    }

    let machine = StateMachine::for_session(session);
    let mut at = machine.initial_state();
    for (index, record) in session.state_history().iter().enumerate() {
        if record.from != at || !machine.can_transition(record.from, record.to) {
            return Err(IntegrityError::BrokenHistory {
                session: session.id,
                index,
                from: record.from,
                to: record.to,
            });
        }
        at = record.to;
    }
    if at != session.current_state() {
        // History ends somewhere other than where the session claims to be.
        return Err(IntegrityError::BrokenHistory {
            session: session.id,
            index: session.state_history().len(),
            from: at,
            to: session.current_state(),
        });
    }
    Ok(())
}
