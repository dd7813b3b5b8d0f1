mod common;

use common::{migrations, MIGRATIONS};
use repokit_core::db::{open_db, open_db_in_memory, DbError, Migration, MigrationSet};
use repokit_core::StoreConfig;
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory(&StoreConfig::default(), &migrations()).unwrap();

    assert_eq!(schema_version(&conn), migrations().latest_version());
    assert_table_exists(&conn, "customers");
    assert_table_exists(&conn, "orders");
    assert!(migrations().pending_migrations(&conn).unwrap().is_empty());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repokit.db");

    let conn_first = open_db(&path, &StoreConfig::default(), &migrations()).unwrap();
    assert_eq!(schema_version(&conn_first), 2);
    drop(conn_first);

    let conn_second = open_db(&path, &StoreConfig::default(), &migrations()).unwrap();
    assert_eq!(schema_version(&conn_second), 2);
    assert_table_exists(&conn_second, "customers");
}

#[test]
fn later_migrations_apply_on_top_of_earlier_ones() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staged.db");
    let first_only = MigrationSet::new(MIGRATIONS[..1].iter().copied()).unwrap();

    let conn = open_db(&path, &StoreConfig::default(), &first_only).unwrap();
    assert_eq!(schema_version(&conn), 1);
    assert_eq!(
        migrations().pending_migrations(&conn).unwrap(),
        vec!["create_orders"]
    );
    drop(conn);

    let conn = open_db(&path, &StoreConfig::default(), &migrations()).unwrap();
    assert_eq!(schema_version(&conn), 2);
    assert_table_exists(&conn, "orders");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, &StoreConfig::default(), &migrations()).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failing_migration_leaves_schema_untouched() {
    let broken = MigrationSet::new([
        MIGRATIONS[0],
        Migration {
            version: 2,
            title: "broken",
            sql: "CREATE TABLE oops (;",
        },
    ])
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.db");
    assert!(open_db(&path, &StoreConfig::default(), &broken).is_err());

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 0);
    assert_table_missing(&conn, "customers");
}

#[test]
fn migration_versions_must_increase() {
    let err = MigrationSet::new([MIGRATIONS[1], MIGRATIONS[0]]).unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidMigrationOrder {
            previous: 2,
            next: 1
        }
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn table_exists(conn: &Connection, table_name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert!(table_exists(conn, table_name), "table {table_name} does not exist");
}

fn assert_table_missing(conn: &Connection, table_name: &str) {
    assert!(!table_exists(conn, table_name), "table {table_name} exists");
}
