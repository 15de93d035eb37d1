//! Expiry-based garbage collection.
//!
//! # Retention Policy
//!
//! | Session | Action |
//! |---------|--------|
//! | `expires_at` in the future | Keep |
//! | Expired, lock held | Keep (an operation is using it) |
//! | Expired, terminal | Delete |
//! | Expired, non-terminal | Mark branch record `expired`, then delete |
//!
//! Expiry is absolute: `expires_at` is fixed at creation and activity does not
//! extend it. Running the collector again with nothing newly expired removes
//! nothing.

use chrono::{DateTime, Utc};

use super::atomic::remove_if_exists;
use super::store::{Result, SessionStore};

impl SessionStore {
    /// Deletes every expired, unlocked session. Returns how many were removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.cleanup_expired_at(Utc::now())
    }

    /// [`cleanup_expired`](Self::cleanup_expired) evaluated at `now`.
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|s| s.is_expired_at(now))
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let mut index = self.read_index()?;
        let mut index_changed = false;
        let mut removed = 0;

        for session in &expired {
            if self.is_locked(session.id) {
                tracing::debug!(session = %session.id, "skipping expired session: locked");
                continue;
            }
            if !session.is_terminal() {
                index_changed |= index.mark_expired(session);
            }
            if remove_if_exists(&self.session_path(session.id))? {
                removed += 1;
                tracing::info!(
                    session = %session.id,
                    branch = %session.branch_name,
                    state = %session.current_state(),
                    "expired session removed"
                );
            }
        }

        if index_changed {
            self.write_index(&index)?;
        }

        Ok(removed)
    }
}
