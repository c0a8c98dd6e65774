pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Pooled SQLite connections. Every connection runs in WAL mode with a busy
/// timeout, so readers never wait on the writer and writers queue briefly.
pub type DbPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    // Timeout first: switching to WAL needs a lock other new connections may hold.
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Open (or create) the database at the given path with schema initialized
/// and migrations applied.
pub fn open_database(path: impl AsRef<Path>, pool_size: u32) -> Result<DbPool> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(configure_connection);
    let pool = Pool::builder()
        .max_size(pool_size.max(1))
        .build(manager)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    prepare(&pool)?;

    tracing::info!(path = %path.display(), pool_size, "database initialized");
    Ok(pool)
}

/// Open an in-memory database. The pool holds a single connection because
/// each SQLite in-memory connection is its own database.
pub fn open_memory_database() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(configure_connection);
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .context("failed to open in-memory database")?;
    prepare(&pool)?;
    Ok(pool)
}

fn prepare(pool: &DbPool) -> Result<()> {
    let conn = pool.get().context("failed to get connection")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(())
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub schema_version: u32,
    pub record_count: u64,
}

/// Run SQLite's integrity check and report schema version and record count.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let schema_version = migrations::get_schema_version(conn)?;
    let record_count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

    Ok(HealthReport {
        integrity_ok: integrity == "ok",
        schema_version,
        record_count: record_count as u64,
    })
}
