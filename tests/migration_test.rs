use recollect::db;
use recollect::db::migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};
use recollect::storage::{SqliteStorage, Storage, Table};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn fresh_db_migrates_to_current_version() {
    let pool = db::open_memory_database().unwrap();
    let conn = pool.get().unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migrations_are_idempotent() {
    let pool = db::open_memory_database().unwrap();
    let conn = pool.get().unwrap();
    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn v1_file_is_upgraded_on_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("v1.db");

    // A database written before per-record modification times existed.
    {
        let conn = Connection::open(&path).unwrap();
        db::schema::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO records (tbl, key, version, value, created_at) \
             VALUES ('profiles', 'u1', 3, '{\"user_id\":\"u1\"}', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    let storage = SqliteStorage::open(&path, 2).unwrap();
    {
        let conn = storage.pool().get().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        let updated_at: String = conn
            .query_row(
                "SELECT updated_at FROM records WHERE tbl = 'profiles' AND key = 'u1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(updated_at, "2026-01-01T00:00:00Z");
    }

    let record = storage.get(Table::Profiles, "u1").unwrap().unwrap();
    assert_eq!(record.version, 3);
    assert!(storage
        .put_if_version(Table::Profiles, "u1", 3, &json!({"user_id": "u1", "v": 2}))
        .unwrap());
}
