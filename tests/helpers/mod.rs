#![allow(dead_code)]

use std::sync::Arc;

use recollect::config::RecollectConfig;
use recollect::memory::types::Payload;
use recollect::storage::{InMemoryStorage, SqliteStorage};
use recollect::MemoryManager;
use serde_json::Value;
use tempfile::TempDir;

/// Engine over the in-memory backend with default configuration.
pub fn memory_manager() -> MemoryManager {
    MemoryManager::new(Arc::new(InMemoryStorage::new()), &RecollectConfig::default())
}

/// Engine over a SQLite file inside a fresh temp dir. Keep the `TempDir`
/// alive for as long as the manager is used.
pub fn sqlite_manager() -> (TempDir, MemoryManager) {
    let tmp = TempDir::new().unwrap();
    let storage = SqliteStorage::open(tmp.path().join("memory.db"), 4).unwrap();
    let manager = MemoryManager::new(Arc::new(storage), &RecollectConfig::default());
    (tmp, manager)
}

/// Run `check` once against each backend.
pub fn for_each_backend(check: impl Fn(&str, &MemoryManager)) {
    check("memory", &memory_manager());
    let (_tmp, sqlite) = sqlite_manager();
    check("sqlite", &sqlite);
}

/// Convert a `json!({...})` literal into a payload.
pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().expect("payload must be a JSON object")
}
