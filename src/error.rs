//! Typed engine errors.
//!
//! [`MemoryError`] is what every engine operation returns. "Nothing found"
//! outcomes (no qualifying pattern, no relevant memories, nothing to reap) are
//! never errors; they come back as empty vectors or `None`.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the memory engine.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("no such session: {0}")]
    NoSuchSession(String),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("invalid expertise level: {0:?} (expected beginner, intermediate, advanced or expert)")]
    InvalidLevel(String),

    #[error("invalid pattern type: {0:?}")]
    InvalidPatternType(String),

    #[error("invalid memory type: {0:?}")]
    InvalidMemoryType(String),

    /// Empty or malformed user, session, or memory-key identifier.
    #[error("invalid {kind}: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    /// A session id was reused by a different user.
    #[error("session {session_id} already belongs to user {owner}")]
    SessionConflict { session_id: String, owner: String },

    /// An optimistic update kept losing the version race.
    #[error("write contention on {table}/{key} after {attempts} attempts")]
    Contention {
        table: &'static str,
        key: String,
        attempts: usize,
    },

    /// The storage layer failed (I/O, pool, serialization). Never retried here.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// Result alias for engine operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
