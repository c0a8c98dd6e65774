//! Ephemeral in-process backend.
//!
//! Each table has its own `RwLock`, held only for the duration of one
//! primitive operation. Conditional writes give the same guarantees as the
//! SQLite backend, which makes this a faithful stand-in for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::{Storage, StorageError, StorageResult, Table, Versioned};

type TableMap = BTreeMap<String, Versioned>;

/// In-memory [`Storage`] implementation.
pub struct InMemoryStorage {
    tables: HashMap<Table, RwLock<TableMap>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let tables = Table::ALL
            .iter()
            .map(|t| (*t, RwLock::new(TableMap::new())))
            .collect();
        Self { tables }
    }

    fn read(&self, table: Table) -> StorageResult<RwLockReadGuard<'_, TableMap>> {
        self.tables[&table]
            .read()
            .map_err(|e| StorageError::Poisoned(format!("{table}: {e}")))
    }

    fn write(&self, table: Table) -> StorageResult<RwLockWriteGuard<'_, TableMap>> {
        self.tables[&table]
            .write()
            .map_err(|e| StorageError::Poisoned(format!("{table}: {e}")))
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<Versioned>> {
        Ok(self.read(table)?.get(key).cloned())
    }

    fn put_if_absent(&self, table: Table, key: &str, value: &Value) -> StorageResult<bool> {
        let mut map = self.write(table)?;
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Versioned {
                version: 1,
                value: value.clone(),
            },
        );
        Ok(true)
    }

    fn put_if_version(
        &self,
        table: Table,
        key: &str,
        expected: u64,
        value: &Value,
    ) -> StorageResult<bool> {
        let mut map = self.write(table)?;
        match map.get_mut(key) {
            Some(current) if current.version == expected => {
                current.version += 1;
                current.value = value.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete(&self, table: Table, key: &str) -> StorageResult<bool> {
        Ok(self.write(table)?.remove(key).is_some())
    }

    fn delete_if_version(&self, table: Table, key: &str, expected: u64) -> StorageResult<bool> {
        let mut map = self.write(table)?;
        if map.get(key).map(|v| v.version) == Some(expected) {
            map.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<(String, Versioned)>> {
        let map = self.read(table)?;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn count(&self, table: Table) -> StorageResult<usize> {
        Ok(self.read(table)?.len())
    }
}
