use recollect::db;
use recollect::storage::{SqliteStorage, Storage, Table};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let pool = db::open_database(&db_path, 2).unwrap();

    assert!(db_path.exists());

    let conn = pool.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_valid_db() {
    let pool = db::open_memory_database().unwrap();
    let storage = SqliteStorage::from_pool(pool.clone());
    storage
        .put_if_absent(Table::Profiles, "u1", &json!({}))
        .unwrap();

    let conn = pool.get().unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.record_count, 1);
}

#[test]
fn connections_use_wal_and_busy_timeout() {
    let tmp = TempDir::new().unwrap();
    let pool = db::open_database(tmp.path().join("test.db"), 2).unwrap();
    let conn = pool.get().unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);

    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn records_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("persist.db");

    {
        let storage = SqliteStorage::open(&path, 2).unwrap();
        storage
            .put_if_absent(Table::Sessions, "s1", &json!({"n": 1}))
            .unwrap();
        assert!(storage
            .put_if_version(Table::Sessions, "s1", 1, &json!({"n": 2}))
            .unwrap());
    }

    let storage = SqliteStorage::open(&path, 2).unwrap();
    let record = storage.get(Table::Sessions, "s1").unwrap().unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.value, json!({"n": 2}));
}
