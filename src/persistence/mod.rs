//! Session persistence.
//!
//! The session store keeps one JSON file per session, a branch index recording
//! the most recent outcome for every branch name ever used, and one lock file
//! per claimed session.
//!
//! # Crash Safety
//!
//! - Session records and the branch index are written atomically using
//!   write-to-temp-then-rename, with fsync on both the file and its directory.
//! - Locks are created with an atomic create-if-absent, so two operations can
//!   never both believe they hold the same session.

pub mod atomic;
pub mod expiry;
pub mod lock;
pub mod record;
pub mod store;

pub use lock::{LockError, SessionLock};
pub use record::{
    BranchIndex, BranchOutcome, BranchRecord, LockInfo, MergeRetirement, SCHEMA_VERSION,
};
pub use store::{IntegrityError, MAX_SESSION_TTL_HOURS, Result, SessionStore, StoreError};
