//! Durable record storage behind a swappable interface.
//!
//! The engine never talks to a database directly. Every store in
//! [`crate::memory`] holds an `Arc<dyn Storage>` and works in terms of
//! versioned JSON records addressed by `(table, key)`. Two backends ship:
//! [`SqliteStorage`] for durable deployments and [`InMemoryStorage`] for tests
//! and ephemeral use.
//!
//! Writes are conditional: [`Storage::put_if_absent`] gives exactly-once
//! creation and [`Storage::put_if_version`] gives per-record optimistic
//! concurrency. Neither backend takes a lock for longer than one primitive
//! operation.

mod memory;
mod sqlite;

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

use serde_json::Value;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Logical tables. Each is an independent key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// One [`crate::memory::types::UserProfile`] per user id.
    Profiles,
    /// One [`crate::memory::types::SessionTranscript`] per session id.
    Sessions,
    /// `user \x1f session` → `{}`; lists a user's sessions.
    UserSessions,
    /// `user \x1f type \x1f key` → [`crate::memory::types::CrossSessionMemoryEntry`].
    Memories,
    /// Entry id → composite memory key.
    MemoryIds,
    /// `user \x1f pattern_type` → [`crate::memory::types::AdaptiveResponsePattern`].
    Patterns,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Profiles,
        Table::Sessions,
        Table::UserSessions,
        Table::Memories,
        Table::MemoryIds,
        Table::Patterns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Sessions => "sessions",
            Self::UserSessions => "user_sessions",
            Self::Memories => "memories",
            Self::MemoryIds => "memory_ids",
            Self::Patterns => "patterns",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value together with its version. Versions start at 1 and grow by
/// one on every successful conditional write.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub value: Value,
}

/// Key/record store consumed by the engine.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait Storage: Send + Sync {
    /// Fetch a record.
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<Versioned>>;

    /// Insert a record at version 1 unless the key exists. Returns `true` if
    /// this call created it.
    fn put_if_absent(&self, table: Table, key: &str, value: &Value) -> StorageResult<bool>;

    /// Replace a record only if its current version equals `expected`.
    /// Returns `false` on a version mismatch or a missing key.
    fn put_if_version(
        &self,
        table: Table,
        key: &str,
        expected: u64,
        value: &Value,
    ) -> StorageResult<bool>;

    /// Delete a record. Returns `true` if something was removed.
    fn delete(&self, table: Table, key: &str) -> StorageResult<bool>;

    /// Delete a record only if its current version equals `expected`.
    fn delete_if_version(&self, table: Table, key: &str, expected: u64) -> StorageResult<bool>;

    /// All records whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<(String, Versioned)>>;

    /// Number of records in a table.
    fn count(&self, table: Table) -> StorageResult<usize> {
        Ok(self.scan_prefix(table, "")?.len())
    }
}

/// Separator between the parts of a composite key (ASCII unit separator).
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Join already-validated parts into a composite key.
pub fn composite_key(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// Prefix matching every composite key that starts with `parts`.
pub fn key_prefix(parts: &[&str]) -> String {
    let mut prefix = composite_key(parts);
    prefix.push(KEY_SEPARATOR);
    prefix
}

/// Split a composite key back into its parts.
pub fn split_key(key: &str) -> Vec<&str> {
    key.split(KEY_SEPARATOR).collect()
}
