//! SQLite persistence adapter.
//!
//! # Responsibility
//! - Open and configure SQLite connections and apply caller migrations.
//! - Translate compiled query plans into SQL and run them.
//! - Provide the SQLite unit of work, set and SQL executor.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Every multi-statement write runs inside one savepoint.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod render;
mod set;
mod sql_executor;
mod store;
mod tracker;
mod unit_of_work;
mod value;

pub use migrations::{Migration, MigrationSet};
pub use open::{open_db, open_db_in_memory};
pub use set::SqliteSet;
pub use sql_executor::SqliteSqlExecutor;
pub use tracker::EntryState;
pub use unit_of_work::{SqliteRepository, SqliteUnitOfWork};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Migration versions must be positive and strictly increasing.
    InvalidMigrationOrder {
        previous: u32,
        next: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InvalidMigrationOrder { previous, next } => write!(
                f,
                "migration version {next} must be greater than {previous}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::InvalidMigrationOrder { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
