mod migration;
mod schema_check;
mod statements;

pub use migration::{MigrationError, MigrationUnit, Migrator, MIGRATIONS_TABLE};
pub use schema_check::{validate_tables, Column, ForeignKey, ForeignKeyOnDelete, SqlType, Table};
pub use statements::split_statements;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

/// Migration units shipped with the crate, in application order.
pub fn embedded_migrations() -> Vec<MigrationUnit> {
    vec![
        MigrationUnit::new(
            "0001_create_services",
            include_str!("../../migrations/0001_create_services.sql"),
        ),
        MigrationUnit::new(
            "0002_create_skus",
            include_str!("../../migrations/0002_create_skus.sql"),
        ),
        MigrationUnit::new(
            "0003_create_pricing_info",
            include_str!("../../migrations/0003_create_pricing_info.sql"),
        ),
        MigrationUnit::new(
            "0004_create_pricing_updates",
            include_str!("../../migrations/0004_create_pricing_updates.sql"),
        ),
    ]
}

impl Migrator {
    pub fn embedded() -> Self {
        Self::new(embedded_migrations()).expect("embedded migration names are unique")
    }
}

/// Open a database from a `DATABASE_URL`-style string.
///
/// `file:` URIs (with query parameters such as `mode=memory&cache=shared`)
/// are passed to SQLite as URIs, `sqlite://` prefixes are stripped and
/// anything else is treated as a plain path. Foreign key enforcement is
/// turned on for the returned connection.
pub fn connect(url: &str) -> rusqlite::Result<Connection> {
    let target = url.strip_prefix("sqlite://").unwrap_or(url);
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    debug!("Opening SQLite database {}", target);
    let conn = Connection::open_with_flags(target, flags)?;
    conn.execute("PRAGMA foreign_keys = ON;", [])?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;

    #[test]
    fn test_connect_enables_foreign_keys() {
        let conn = connect("file:connect_fk?mode=memory").unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_connect_accepts_plain_path_and_sqlite_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.db");
        connect(path.to_str().unwrap()).unwrap();
        assert!(path.exists());

        let prefixed = dir.path().join("prefixed.db");
        connect(&format!("sqlite://{}", prefixed.display())).unwrap();
        assert!(prefixed.exists());
    }

    #[test]
    fn test_embedded_migrations_are_ordered_and_apply() {
        let migrator = Migrator::embedded();
        let names: Vec<&str> = migrator.units().iter().map(|u| u.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), 4);

        let mut conn = connect("file:embedded_apply?mode=memory").unwrap();
        let applied = migrator.apply(&mut conn, &CallContext::background()).unwrap();
        assert_eq!(applied.len(), 4);
        assert!(migrator.pending(&conn).unwrap().is_empty());
    }
}
