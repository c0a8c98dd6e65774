pub mod archive;
pub mod cross_session;
pub mod maintenance;
pub mod manager;
pub mod patterns;
pub mod profile;
pub mod session;
pub mod stats;
pub mod summary;
pub mod types;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{MemoryError, MemoryResult};
use crate::storage::{Storage, StorageError, Table, KEY_SEPARATOR};

/// How many times an optimistic update re-reads after losing a version race.
const MAX_WRITE_ATTEMPTS: usize = 256;

/// Attempts that only yield before backing off with a short sleep.
const SPIN_ATTEMPTS: usize = 4;

pub(crate) fn encode<T: Serialize>(record: &T) -> MemoryResult<Value> {
    serde_json::to_value(record).map_err(|e| StorageError::from(e).into())
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> MemoryResult<T> {
    serde_json::from_value(value).map_err(|e| StorageError::from(e).into())
}

/// Load and decode a record.
pub(crate) fn load<T: DeserializeOwned>(
    storage: &dyn Storage,
    table: Table,
    key: &str,
) -> MemoryResult<Option<T>> {
    storage
        .get(table, key)?
        .map(|v| decode(v.value))
        .transpose()
}

/// Atomic read-modify-write of one record using its version.
///
/// `apply` mutates the decoded record and returns whether it changed; an
/// unchanged record is returned without writing. On a version conflict the
/// record is re-read and `apply` runs again on the fresh copy, so it must be
/// a pure function of the record. Returns `None` if the record does not exist.
pub(crate) fn modify<T, F>(
    storage: &dyn Storage,
    table: Table,
    key: &str,
    mut apply: F,
) -> MemoryResult<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&mut T) -> MemoryResult<bool>,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let Some(current) = storage.get(table, key)? else {
            return Ok(None);
        };
        let mut record: T = decode(current.value)?;
        if !apply(&mut record)? {
            return Ok(Some(record));
        }
        if storage.put_if_version(table, key, current.version, &encode(&record)?)? {
            return Ok(Some(record));
        }
        tracing::trace!(table = %table, key, attempt, "version conflict, retrying");
        backoff(attempt);
    }

    Err(MemoryError::Contention {
        table: table.as_str(),
        key: key.to_string(),
        attempts: MAX_WRITE_ATTEMPTS,
    })
}

fn backoff(attempt: usize) {
    if attempt <= SPIN_ATTEMPTS {
        std::thread::yield_now();
    } else {
        let micros = 25 * (attempt - SPIN_ATTEMPTS).min(40) as u64;
        std::thread::sleep(Duration::from_micros(micros));
    }
}

/// Reject empty identifiers and ones containing control characters (which
/// would collide with the composite-key separator).
pub(crate) fn validate_id(kind: &'static str, value: &str) -> MemoryResult<()> {
    if is_well_formed(value) {
        Ok(())
    } else {
        Err(MemoryError::InvalidId {
            kind,
            value: value.to_string(),
        })
    }
}

/// Type tags (memory types, pattern types) must be non-empty, free of control
/// characters and whitespace.
pub(crate) fn is_valid_type_tag(tag: &str) -> bool {
    is_well_formed(tag) && !tag.chars().any(char::is_whitespace)
}

fn is_well_formed(value: &str) -> bool {
    !value.trim().is_empty() && !value.chars().any(|c| c == KEY_SEPARATOR || c.is_control())
}
