//! Advisory per-session locks.
//!
//! A lock is the file `locks/<id>.lock`, created with create-if-absent. The lock
//! never blocks: a failed acquisition means "session busy" and callers report it
//! rather than retry. Locks are non-reentrant. A lock leaked by a crashed process
//! stays until [`SessionStore::release_lock`] is called for it.

use chrono::Utc;
use uuid::Uuid;

use super::atomic::{create_exclusive, read_json, remove_if_exists};
use super::record::LockInfo;
use super::store::{Result, SessionStore, StoreError};
use crate::types::SessionId;

impl SessionStore {
    /// Claims the session. Returns `false` if someone else holds it.
    pub fn acquire_lock(&self, id: SessionId) -> Result<bool> {
        let mut session = self.require(id)?;

        let info = LockInfo {
            lock_id: Uuid::new_v4(),
            session_id: id,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&info)?;
        if !create_exclusive(&self.lock_path(id), &bytes)? {
            tracing::debug!(session = %id, "lock already held");
            return Ok(false);
        }

        session.lock_id = Some(info.lock_id);
        if let Err(e) = self.write_session(&session) {
            remove_if_exists(&self.lock_path(id))?;
            return Err(e);
        }

        tracing::debug!(session = %id, lock = %info.lock_id, "lock acquired");
        Ok(true)
    }

    /// Releases the session's lock. Releasing an unheld lock is a no-op.
    pub fn release_lock(&self, id: SessionId) -> Result<()> {
        if let Some(mut session) = self.get(id)?
            && session.lock_id.is_some()
        {
            session.lock_id = None;
            self.write_session(&session)?;
        }
        if remove_if_exists(&self.lock_path(id))? {
            tracing::debug!(session = %id, "lock released");
        }
        Ok(())
    }

    /// Returns true if the session's lock file exists.
    pub fn is_locked(&self, id: SessionId) -> bool {
        self.lock_path(id).exists()
    }

    /// Who holds the session's lock, if anyone.
    pub fn lock_info(&self, id: SessionId) -> Result<Option<LockInfo>> {
        Ok(read_json(&self.lock_path(id))?)
    }

    /// Claims the session and returns a guard that releases it when dropped.
    ///
    /// Returns `None` if the session is already locked.
    pub fn lock(&self, id: SessionId) -> Result<Option<SessionLock<'_>>> {
        if self.acquire_lock(id)? {
            Ok(Some(SessionLock {
                store: self,
                id,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Like [`lock`](Self::lock) but treats contention as an error.
    pub fn lock_or_busy(&self, id: SessionId) -> std::result::Result<SessionLock<'_>, LockError> {
        match self.lock(id)? {
            Some(guard) => Ok(guard),
            None => Err(LockError::Busy(id)),
        }
    }
}

/// Error from [`SessionStore::lock_or_busy`].
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("session {0} is busy: another operation holds its lock")]
    Busy(SessionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Holds a session's lock for the lifetime of the guard.
#[derive(Debug)]
pub struct SessionLock<'a> {
    store: &'a SessionStore,
    id: SessionId,
    released: bool,
}

impl SessionLock<'_> {
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Releases the lock now, reporting any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.release_lock(self.id)
    }
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.store.release_lock(self.id)
        {
            tracing::warn!(session = %self.id, error = %e, "failed to release session lock");
        }
    }
}
