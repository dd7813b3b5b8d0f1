//! Generic data-access layer: repositories, units of work, composable
//! queries and a raw SQL executor over pluggable stores.
//!
//! `MemorySet` serves tests and fixtures; the `db` module is the SQLite
//! adapter.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::entity::{AuditColumns, Entity, EntitySchema, Navigation, Record};
pub use model::value::{FromValue, KeyValue, Value};
pub use query::config::{QueryConfig, Scope, Tracking};
pub use query::filter::{CompareOp, Filter, TextOp};
pub use query::paging::{PageRequest, PagingWindow};
pub use query::plan::{Query, QueryPlan, Stage, PIPELINE};
pub use query::sort::{SortDirection, SortSequence, Sorting};
pub use query::spec::{Spec, Specification, TranslationError};
pub use repo::asynchronous::{
    AsyncEntityLoader, AsyncEntitySet, AsyncReader, AsyncSqlExecutor, AsyncUnitOfWork, AsyncWriter,
};
pub use repo::error::{RepoError, RepoResult};
pub use repo::memory::MemorySet;
pub use repo::read::Reader;
pub use repo::set::EntitySet;
pub use repo::sql::{ParamValue, SqlConfig, SqlExecutor};
pub use repo::unit_of_work::{EntityLoader, SaveOptions, UnitOfWork};
pub use repo::write::{Update, Writer};
pub use repo::Repository;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
