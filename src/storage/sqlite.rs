//! Durable backend on pooled SQLite connections.
//!
//! Each trait method checks a connection out of the pool and runs one
//! statement, so conditional writes are atomic at the SQLite level and no
//! lock outlives a single statement.

use std::path::Path;

use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use super::{Storage, StorageResult, Table, Versioned};
use crate::db::{self, DbPool};

/// SQLite-backed [`Storage`].
#[derive(Clone)]
pub struct SqliteStorage {
    pool: DbPool,
}

impl SqliteStorage {
    /// Wrap an already-initialized pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file with schema and migrations applied.
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> anyhow::Result<Self> {
        Ok(Self::from_pool(db::open_database(path, pool_size)?))
    }

    /// Single-connection in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::from_pool(db::open_memory_database()?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Storage for SqliteStorage {
    fn get(&self, table: Table, key: &str) -> StorageResult<Option<Versioned>> {
        let conn = self.pool.get()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT version, value FROM records WHERE tbl = ?1 AND key = ?2",
                params![table.as_str(), key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(version, value)| -> StorageResult<Versioned> {
            Ok(Versioned {
                version: version as u64,
                value: serde_json::from_str(&value)?,
            })
        })
        .transpose()
    }

    fn put_if_absent(&self, table: Table, key: &str, value: &Value) -> StorageResult<bool> {
        let conn = self.pool.get()?;
        let now = now();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO records (tbl, key, version, value, created_at, updated_at) \
             VALUES (?1, ?2, 1, ?3, ?4, ?4)",
            params![table.as_str(), key, value.to_string(), now],
        )?;
        Ok(inserted == 1)
    }

    fn put_if_version(
        &self,
        table: Table,
        key: &str,
        expected: u64,
        value: &Value,
    ) -> StorageResult<bool> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE records SET value = ?1, version = version + 1, updated_at = ?2 \
             WHERE tbl = ?3 AND key = ?4 AND version = ?5",
            params![value.to_string(), now(), table.as_str(), key, expected as i64],
        )?;
        Ok(updated == 1)
    }

    fn delete(&self, table: Table, key: &str) -> StorageResult<bool> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM records WHERE tbl = ?1 AND key = ?2",
            params![table.as_str(), key],
        )?;
        Ok(deleted == 1)
    }

    fn delete_if_version(&self, table: Table, key: &str, expected: u64) -> StorageResult<bool> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM records WHERE tbl = ?1 AND key = ?2 AND version = ?3",
            params![table.as_str(), key, expected as i64],
        )?;
        Ok(deleted == 1)
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> StorageResult<Vec<(String, Versioned)>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT key, version, value FROM records \
             WHERE tbl = ?1 AND substr(key, 1, length(?2)) = ?2 \
             ORDER BY key",
        )?;
        let rows: Vec<(String, i64, String)> = stmt
            .query_map(params![table.as_str(), prefix], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, version, value)| -> StorageResult<(String, Versioned)> {
                Ok((
                    key,
                    Versioned {
                        version: version as u64,
                        value: serde_json::from_str(&value)?,
                    },
                ))
            })
            .collect()
    }

    fn count(&self, table: Table) -> StorageResult<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE tbl = ?1",
            params![table.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
