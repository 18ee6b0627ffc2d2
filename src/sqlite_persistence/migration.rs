//! Tracked, transactional migration runner.
//!
//! Each [`MigrationUnit`] is a named block of SQL. The unit name doubles as
//! its version: units are applied in ascending lexical name order, so names
//! must sort in the intended application order (e.g. `0001_services`,
//! `0002_skus`, ...). The runner cannot verify that convention.
//!
//! Applied units are recorded in the `schema_migrations` table. All pending
//! units of one [`Migrator::apply`] call run inside a single transaction
//! together with their tracking rows: either every pending unit is applied
//! and recorded, or the schema is left exactly as it was.
//!
//! Units must not contain their own `BEGIN`/`COMMIT`/`END`/`ROLLBACK`:
//! [`Migrator::new`] rejects them. Statements that only take effect outside
//! a transaction (like `PRAGMA foreign_keys`) are no-ops here.
//!
//! The batch runs under `BEGIN IMMEDIATE` and reads the tracking table inside
//! it, so concurrent migrators on the same file serialize and the later one
//! finds nothing pending.

use super::statements::{is_transaction_control, split_statements};
use crate::context::{CallContext, Interrupted};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const MIGRATIONS_TABLE: &str = "schema_migrations";

const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {unit} failed at statement {statement}: {source}")]
    Statement {
        unit: String,
        statement: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("migration {unit} interrupted: {source}")]
    Interrupted {
        unit: String,
        #[source]
        source: Interrupted,
    },

    #[error("failed to record migration {unit}: {source}")]
    Tracking {
        unit: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("duplicate migration unit name: {0}")]
    DuplicateUnit(String),

    #[error("migration {unit} statement {statement} begins or ends a transaction")]
    TransactionControl { unit: String, statement: usize },

    #[error("failed to commit migrations {}: {source}", .units.join(", "))]
    Commit {
        units: Vec<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read migration tracking table: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to load migration from {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrationError {
    /// Name of the unit the failure belongs to, when there is one.
    pub fn unit(&self) -> Option<&str> {
        match self {
            MigrationError::Statement { unit, .. }
            | MigrationError::Interrupted { unit, .. }
            | MigrationError::Tracking { unit, .. }
            | MigrationError::TransactionControl { unit, .. } => Some(unit.as_str()),
            MigrationError::DuplicateUnit(unit) => Some(unit.as_str()),
            // Reported under the last unit of the failed batch
            MigrationError::Commit { units, .. } => units.last().map(String::as_str),
            MigrationError::Store(_) | MigrationError::Load { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub name: String,
    pub sql: String,
}

impl MigrationUnit {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        split_statements(&self.sql)
    }
}

pub struct Migrator {
    units: Vec<MigrationUnit>,
}

impl Migrator {
    /// Build a migrator over the given units, sorted by name.
    ///
    /// Fails on duplicate names and on units carrying their own transaction
    /// control statements.
    pub fn new(mut units: Vec<MigrationUnit>) -> Result<Self, MigrationError> {
        let mut seen = HashSet::new();
        for unit in &units {
            if !seen.insert(unit.name.as_str()) {
                return Err(MigrationError::DuplicateUnit(unit.name.clone()));
            }
            if let Some(index) = unit
                .statements()
                .iter()
                .position(|statement| is_transaction_control(statement))
            {
                return Err(MigrationError::TransactionControl {
                    unit: unit.name.clone(),
                    statement: index + 1,
                });
            }
        }
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { units })
    }

    /// Load every `*.sql` file of a directory as a unit named after the file stem.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, MigrationError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| MigrationError::Load {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut units = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| MigrationError::Load {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                return Err(MigrationError::Load {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "migration file name is not valid UTF-8",
                    ),
                });
            };
            let sql = std::fs::read_to_string(&path).map_err(|source| MigrationError::Load {
                path: path.clone(),
                source,
            })?;
            units.push(MigrationUnit::new(name, sql));
        }
        Self::new(units)
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    /// Versions recorded in the tracking table. Read-only: a database that
    /// was never migrated has no tracking table and reports nothing applied.
    pub fn applied_versions(&self, conn: &Connection) -> Result<BTreeSet<String>, MigrationError> {
        let table: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![MIGRATIONS_TABLE],
                |row| row.get(0),
            )
            .optional()?;
        if table.is_none() {
            return Ok(BTreeSet::new());
        }
        read_applied_versions(conn)
    }

    /// Units not yet recorded as applied, in application order.
    pub fn pending(&self, conn: &Connection) -> Result<Vec<&MigrationUnit>, MigrationError> {
        let applied = self.applied_versions(conn)?;
        Ok(self.pending_given(&applied))
    }

    fn pending_given(&self, applied: &BTreeSet<String>) -> Vec<&MigrationUnit> {
        self.units
            .iter()
            .filter(|unit| !applied.contains(&unit.name))
            .collect()
    }

    /// Apply every pending unit atomically and return the names applied.
    ///
    /// Safe to call repeatedly: a second call with the same units is a no-op,
    /// and units left unrecorded by a failed call are retried from scratch.
    pub fn apply(
        &self,
        conn: &mut Connection,
        ctx: &CallContext,
    ) -> Result<Vec<String>, MigrationError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(CREATE_MIGRATIONS_TABLE)?;
        let applied = read_applied_versions(&tx)?;
        let pending = self.pending_given(&applied);
        if pending.is_empty() {
            tx.commit()?;
            debug!("Schema is up to date, no migrations pending");
            return Ok(Vec::new());
        }

        info!("Applying {} pending migration(s)", pending.len());
        for unit in &pending {
            for (index, statement) in unit.statements().iter().enumerate() {
                ctx.check().map_err(|source| MigrationError::Interrupted {
                    unit: unit.name.clone(),
                    source,
                })?;
                tx.execute_batch(statement)
                    .map_err(|source| MigrationError::Statement {
                        unit: unit.name.clone(),
                        statement: index + 1,
                        source,
                    })?;
                if tx.is_autocommit() {
                    return Err(MigrationError::TransactionControl {
                        unit: unit.name.clone(),
                        statement: index + 1,
                    });
                }
            }
            debug!("Executed migration {}", unit.name);
        }

        for unit in &pending {
            tx.execute(
                "INSERT INTO schema_migrations (version) VALUES (?1)",
                params![unit.name],
            )
            .map_err(|source| MigrationError::Tracking {
                unit: unit.name.clone(),
                source,
            })?;
        }

        let applied: Vec<String> = pending.iter().map(|unit| unit.name.clone()).collect();
        if let (Err(source), Some(last)) = (ctx.check(), applied.last()) {
            return Err(MigrationError::Interrupted {
                unit: last.clone(),
                source,
            });
        }
        tx.commit().map_err(|source| MigrationError::Commit {
            units: applied.clone(),
            source,
        })?;

        info!("Applied migrations: {}", applied.join(", "));
        Ok(applied)
    }
}

fn read_applied_versions(conn: &Connection) -> Result<BTreeSet<String>, MigrationError> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(versions)
}
