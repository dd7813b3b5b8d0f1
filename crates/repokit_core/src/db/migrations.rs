//! Caller-supplied schema migrations.
//!
//! # Responsibility
//! - Hold migrations in strictly increasing version order.
//! - Report and apply the ones a database has not seen yet.
//!
//! # Invariants
//! - Versions are positive and strictly increasing; `MigrationSet::new`
//!   rejects anything else.
//! - The applied version is mirrored to `PRAGMA user_version`.
//! - Pending migrations apply in one transaction: all or none.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub title: &'static str,
    pub sql: &'static str,
}

/// Ordered list of migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    pub fn new(migrations: impl IntoIterator<Item = Migration>) -> DbResult<Self> {
        let migrations: Vec<Migration> = migrations.into_iter().collect();
        let mut previous = 0;
        for migration in &migrations {
            if migration.version <= previous {
                return Err(DbError::InvalidMigrationOrder {
                    previous,
                    next: migration.version,
                });
            }
            previous = migration.version;
        }
        Ok(Self { migrations })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Latest version this set knows, `0` when empty.
    pub fn latest_version(&self) -> u32 {
        self.migrations
            .last()
            .map_or(0, |migration| migration.version)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    /// Titles of migrations newer than the database's version, in order.
    pub fn pending_migrations(&self, conn: &Connection) -> DbResult<Vec<&'static str>> {
        let current = self.checked_version(conn)?;
        Ok(self
            .migrations
            .iter()
            .filter(|migration| migration.version > current)
            .map(|migration| migration.title)
            .collect())
    }

    /// Applies every pending migration; returns how many ran.
    pub fn apply_migrations(&self, conn: &mut Connection) -> DbResult<usize> {
        let current = self.checked_version(conn)?;
        if current == self.latest_version() {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let mut applied = 0;
        for migration in &self.migrations {
            if migration.version <= current {
                continue;
            }

            tx.execute_batch(migration.sql)?;
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
            info!(
                "event=db_migrate module=db status=ok version={} title={}",
                migration.version,
                crate::logging::sanitize_message(migration.title, crate::logging::MAX_TAG_CHARS)
            );
            applied += 1;
        }
        tx.commit()?;

        Ok(applied)
    }

    fn checked_version(&self, conn: &Connection) -> DbResult<u32> {
        let current = current_user_version(conn)?;
        let latest = self.latest_version();
        if current > latest {
            return Err(DbError::UnsupportedSchemaVersion {
                db_version: current,
                latest_supported: latest,
            });
        }
        Ok(current)
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}

pub(crate) fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
