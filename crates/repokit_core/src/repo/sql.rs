//! SQL executor contract, parameters and per-call configuration.
//!
//! # Responsibility
//! - Give callers a dialect-specific escape hatch next to the query
//!   composition contract.
//! - Carry parameters, diagnostic tag and command timeout per call.
//!
//! # Invariants
//! - Named parameters are identified by name; a later one with a name
//!   already present is dropped.
//! - Positional parameters are never deduplicated and bind in insertion
//!   order.

use crate::model::entity::{Entity, Record};
use crate::model::value::{FromValue, Value};
use crate::repo::error::{RepoError, RepoResult};
use std::time::Duration;

/// One SQL parameter.
#[derive(Debug, Clone)]
pub struct ParamValue {
    name: Option<String>,
    value: Value,
}

impl ParamValue {
    /// Named parameter, bound to `:name` (or the name as written when it
    /// already starts with `:`, `@` or `$`).
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.name, &other.name) {
            (Some(left), Some(right)) => left == right,
            (None, None) => self.value == other.value,
            _ => false,
        }
    }
}

/// Immutable options for one SQL executor call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlConfig {
    parameters: Vec<ParamValue>,
    tag: Option<String>,
    command_timeout: Option<Duration>,
}

impl SqlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the parameter set with positional values.
    pub fn with_values<I, V>(&self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            parameters: values.into_iter().map(ParamValue::positional).collect(),
            ..self.clone()
        }
    }

    /// Adds parameters; a named one whose name is already present is
    /// ignored.
    pub fn with_parameters(&self, parameters: impl IntoIterator<Item = ParamValue>) -> Self {
        let mut merged = self.parameters.clone();
        for parameter in parameters {
            push_unique(&mut merged, parameter);
        }
        Self {
            parameters: merged,
            ..self.clone()
        }
    }

    pub fn with_tag(&self, tag: &str) -> RepoResult<Self> {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(RepoError::InvalidArgument(
                "sql tag cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            tag: Some(trimmed.to_string()),
            ..self.clone()
        })
    }

    pub fn with_command_timeout(&self, timeout: Duration) -> Self {
        Self {
            command_timeout: Some(timeout),
            ..self.clone()
        }
    }

    pub fn parameters(&self) -> &[ParamValue] {
        &self.parameters
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }
}

fn push_unique(parameters: &mut Vec<ParamValue>, parameter: ParamValue) {
    if parameter.name.is_none() || !parameters.contains(&parameter) {
        parameters.push(parameter);
    }
}

/// Dialect-specific statement execution and explicit transactions.
pub trait SqlExecutor {
    fn begin_transaction(&self) -> RepoResult<()>;

    fn commit_transaction(&self) -> RepoResult<()>;

    fn rollback_transaction(&self) -> RepoResult<()>;

    fn in_transaction(&self) -> bool;

    /// Runs a query and maps every row.
    fn execute_raw_sql<T, F>(&self, sql: &str, map: F, config: &SqlConfig) -> RepoResult<Vec<T>>
    where
        Self: Sized,
        F: FnMut(&Record) -> RepoResult<T>;

    /// Runs a statement; returns the number of affected rows.
    fn execute_command(&self, sql: &str, config: &SqlConfig) -> RepoResult<u64>;

    /// Runs a query whose columns map onto `E`.
    fn execute_query<E: Entity>(&self, sql: &str, config: &SqlConfig) -> RepoResult<Vec<E>>
    where
        Self: Sized,
    {
        self.execute_raw_sql(sql, |record| E::from_record(record), config)
    }

    /// Calls scalar function `name` with the positional parameters.
    fn execute_function<T: FromValue>(&self, name: &str, config: &SqlConfig) -> RepoResult<T>
    where
        Self: Sized;

    /// Runs the procedure registered as `name`; returns affected rows.
    fn execute_procedure(&self, name: &str, config: &SqlConfig) -> RepoResult<u64>;

    /// Runs `operation` inside a transaction: commit on `Ok`, rollback on
    /// `Err`.
    fn execute_transaction<T, F>(&self, operation: F) -> RepoResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> RepoResult<T>,
    {
        self.begin_transaction()?;
        match operation(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction() {
                    log::warn!(
                        "event=sql_transaction module=repo status=error error_code=rollback_failed error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}
