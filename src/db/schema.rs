//! SQL DDL for the record store.
//!
//! Every logical table of [`crate::storage::Table`] lives in the single
//! `records` table, keyed by `(tbl, key)` and carrying a version for
//! optimistic concurrency. `schema_meta` tracks the schema version. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Versioned JSON records
CREATE TABLE IF NOT EXISTS records (
    tbl TEXT NOT NULL CHECK(tbl IN ('profiles','sessions','user_sessions','memories','memory_ids','patterns')),
    key TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1 CHECK(version >= 1),
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tbl, key)
) WITHOUT ROWID;

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
