//! Repository error and result types.
//!
//! # Invariants
//! - Argument errors are raised by the call that received the argument,
//!   never deferred to commit time.
//! - Concurrency conflicts always name the table and key involved.

use crate::db::DbError;
use crate::model::value::KeyValue;
use crate::query::spec::TranslationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for every repository, set, unit-of-work and SQL executor operation.
#[derive(Debug)]
pub enum RepoError {
    /// Invalid configuration, paging or query argument.
    InvalidArgument(String),
    /// A specification cannot be expressed in the backend query form.
    Translation(TranslationError),
    /// Persisted row changed (or vanished) since it was read.
    ConcurrencyConflict { table: &'static str, key: KeyValue },
    /// A single-result read matched more than one row.
    MultipleResults { table: &'static str },
    /// Persisted data cannot be mapped back into an entity.
    InvalidData(String),
    /// The caller's cancellation token fired before the store was touched.
    Cancelled,
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Translation(err) => write!(f, "{err}"),
            Self::ConcurrencyConflict { table, key } => write!(
                f,
                "concurrency conflict on `{table}` key {key}: row changed since it was read"
            ),
            Self::MultipleResults { table } => {
                write!(f, "expected a single `{table}` row, found several")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Translation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidArgument(_)
            | Self::ConcurrencyConflict { .. }
            | Self::MultipleResults { .. }
            | Self::InvalidData(_)
            | Self::Cancelled => None,
        }
    }
}

impl From<TranslationError> for RepoError {
    fn from(value: TranslationError) -> Self {
        Self::Translation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
