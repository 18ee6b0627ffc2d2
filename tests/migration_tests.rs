//! Migration engine tests against file-backed databases

mod common;

use cloud_pricing_sync::pricing_store::{validate_schema, PricingRepository, PRICING_TABLES};
use cloud_pricing_sync::sqlite_persistence::{
    connect, embedded_migrations, MigrationError, MigrationUnit, Migrator, MIGRATIONS_TABLE,
};
use cloud_pricing_sync::{CallContext, SqlitePricingStore};
use common::{catalog_service, TestStore, SERVICE_1_ID};
use rusqlite::{params, Connection};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn tracked_versions(conn: &Connection) -> Vec<String> {
    if !table_names(conn).contains(&MIGRATIONS_TABLE.to_string()) {
        return Vec::new();
    }
    let mut stmt = conn
        .prepare("SELECT version FROM schema_migrations ORDER BY version")
        .unwrap();
    stmt.query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap()
}

fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .unwrap();
    stmt.query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap()
}

fn write_units(dir: &TempDir, units: &[MigrationUnit]) {
    for unit in units {
        std::fs::write(dir.path().join(format!("{}.sql", unit.name)), &unit.sql).unwrap();
    }
}

#[test]
fn test_fresh_database_gets_full_schema() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pricing.db");
    let mut conn = connect(db_path.to_str().unwrap()).unwrap();

    let applied = Migrator::embedded()
        .apply(&mut conn, &CallContext::background())
        .unwrap();

    assert_eq!(
        applied,
        vec![
            "0001_create_services",
            "0002_create_skus",
            "0003_create_pricing_info",
            "0004_create_pricing_updates",
        ]
    );
    assert_eq!(tracked_versions(&conn), applied);
    validate_schema(&conn).unwrap();

    let tables = table_names(&conn);
    for table in PRICING_TABLES {
        assert!(tables.contains(&table.name.to_string()), "missing {}", table.name);
    }
    assert!(tables.contains(&MIGRATIONS_TABLE.to_string()));
}

#[test]
fn test_reapplying_after_reopen_is_a_no_op() {
    let test = TestStore::new();
    test.store
        .upsert_service(&CallContext::background(), &catalog_service(SERVICE_1_ID))
        .unwrap();

    // A second process opening the same file finds nothing to do
    let mut conn = connect(test.url()).unwrap();
    let migrator = Migrator::embedded();
    assert!(migrator.pending(&conn).unwrap().is_empty());
    let applied = migrator
        .apply(&mut conn, &CallContext::background())
        .unwrap();

    assert!(applied.is_empty());
    assert_eq!(tracked_versions(&conn).len(), 4);
    let services: i64 = conn
        .query_row("SELECT COUNT(*) FROM services", [], |r| r.get(0))
        .unwrap();
    assert_eq!(services, 1);

    let reopened = SqlitePricingStore::open(test.url(), &migrator, &CallContext::background());
    assert!(reopened.is_ok());
}

#[test]
fn test_units_from_directory_extend_embedded_schema() {
    let dir = TempDir::new().unwrap();
    let mut units = embedded_migrations();
    units.push(MigrationUnit::new(
        "0005_create_sku_notes",
        "-- free-form notes; one per SKU\n\
         CREATE TABLE sku_notes (\n\
             sku_id TEXT PRIMARY KEY NOT NULL REFERENCES skus(sku_id) ON DELETE CASCADE,\n\
             note TEXT NOT NULL DEFAULT 'n/a;'\n\
         );\n\
         CREATE INDEX idx_sku_notes_note ON sku_notes(note);\n",
    ));
    write_units(&dir, &units);
    std::fs::write(dir.path().join("README.md"), "not a migration").unwrap();

    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("pricing.db");
    let mut conn = connect(db_path.to_str().unwrap()).unwrap();

    // Embedded units first, then the extra one
    let embedded_only = Migrator::embedded();
    embedded_only
        .apply(&mut conn, &CallContext::background())
        .unwrap();
    let migrator = Migrator::from_dir(dir.path()).unwrap();
    assert_eq!(migrator.units().len(), 5);
    let pending: Vec<String> = migrator
        .pending(&conn)
        .unwrap()
        .into_iter()
        .map(|unit| unit.name.clone())
        .collect();
    assert_eq!(pending, vec!["0005_create_sku_notes"]);

    let applied = migrator
        .apply(&mut conn, &CallContext::background())
        .unwrap();

    assert_eq!(applied, vec!["0005_create_sku_notes"]);
    assert!(table_names(&conn).contains(&"sku_notes".to_string()));
    validate_schema(&conn).unwrap();
}

#[test]
fn test_failing_unit_rolls_back_whole_batch() {
    let dir = TempDir::new().unwrap();
    let mut units = embedded_migrations();
    units.push(MigrationUnit::new(
        "0005_broken",
        "CREATE TABLE half_done (id INTEGER PRIMARY KEY);\nINSERT INTO missing_table VALUES (1);\n",
    ));
    write_units(&dir, &units);

    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("pricing.db");
    let mut conn = connect(db_path.to_str().unwrap()).unwrap();
    let migrator = Migrator::from_dir(dir.path()).unwrap();

    let err = migrator
        .apply(&mut conn, &CallContext::background())
        .unwrap_err();

    match &err {
        MigrationError::Statement {
            unit, statement, ..
        } => {
            assert_eq!(unit, "0005_broken");
            assert_eq!(*statement, 2);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.unit(), Some("0005_broken"));

    // Nothing from the batch survived, not even the embedded units
    let tables = table_names(&conn);
    assert!(!tables.contains(&"services".to_string()));
    assert!(!tables.contains(&"half_done".to_string()));
    assert!(tracked_versions(&conn).is_empty());

    // Fixing the unit lets the whole batch through on the next run
    std::fs::write(
        dir.path().join("0005_broken.sql"),
        "CREATE TABLE half_done (id INTEGER PRIMARY KEY);\n",
    )
    .unwrap();
    let fixed = Migrator::from_dir(dir.path()).unwrap();
    let applied = fixed
        .apply(&mut conn, &CallContext::background())
        .unwrap();
    assert_eq!(applied.len(), 5);
    assert_eq!(
        conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
            params!["0005_broken"],
            |r| r.get::<_, i64>(0),
        )
        .unwrap(),
        1
    );
}

#[test]
fn test_cancelled_apply_leaves_database_untouched() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pricing.db");
    let mut conn = connect(db_path.to_str().unwrap()).unwrap();
    let ctx = CallContext::background();
    ctx.cancellation_token.cancel();

    let err = Migrator::embedded().apply(&mut conn, &ctx).unwrap_err();

    assert!(matches!(err, MigrationError::Interrupted { .. }));
    assert!(!table_names(&conn).contains(&"services".to_string()));
}

#[test]
fn test_concurrent_migrators_apply_each_unit_once() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pricing.db");
    let url = db_path.to_str().unwrap().to_string();
    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let url = url.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut conn = connect(&url).unwrap();
                barrier.wait();
                Migrator::embedded().apply(&mut conn, &CallContext::background())
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // Exactly one worker applies the batch, the others find nothing pending
    let applied: Vec<Vec<String>> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(applied.iter().filter(|units| units.len() == 4).count(), 1);
    assert_eq!(applied.iter().filter(|units| units.is_empty()).count(), workers - 1);

    let conn = connect(&url).unwrap();
    assert_eq!(tracked_versions(&conn).len(), 4);
    validate_schema(&conn).unwrap();
}

#[test]
fn test_directory_unit_with_commit_is_refused_before_touching_database() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("0001_a.sql"),
        "CREATE TABLE a (id INTEGER);\nCOMMIT;\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("0002_b.sql"), "CREATE TABLE b (id INTEGER").unwrap();

    let err = Migrator::from_dir(dir.path()).err().unwrap();

    assert!(matches!(
        err,
        MigrationError::TransactionControl { statement: 2, .. }
    ));
    assert_eq!(err.unit(), Some("0001_a"));
}
