//! SQLite implementation of the SQL executor contract.
//!
//! # Responsibility
//! - Run caller SQL with bound parameters, tag comments and per-call busy
//!   timeouts.
//! - Manage explicit transactions and named procedures.
//!
//! # Invariants
//! - Positional parameters bind to `?1..?n` in order and must cover every
//!   placeholder; named parameters bind by name and must exist in the
//!   statement.
//! - A per-call timeout is restored to the store default afterwards.
//! - Procedures are single statements registered by name before use.

use crate::config::StoreConfig;
use crate::db::render;
use crate::model::entity::Record;
use crate::model::value::{FromValue, Value};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::sql::{SqlConfig, SqlExecutor};
use log::{debug, info};
use rusqlite::{Connection, Statement};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub struct SqliteSqlExecutor<'c> {
    conn: &'c Connection,
    default_timeout: Duration,
    procedures: BTreeMap<String, String>,
}

impl<'c> SqliteSqlExecutor<'c> {
    pub fn new(conn: &'c Connection, config: &StoreConfig) -> Self {
        Self {
            conn,
            default_timeout: config.busy_timeout(),
            procedures: BTreeMap::new(),
        }
    }

    /// Registers `sql` as procedure `name`, replacing any earlier one.
    pub fn register_procedure(&mut self, name: &str, sql: impl Into<String>) -> RepoResult<()> {
        render::quote(name)?;
        self.procedures.insert(name.to_string(), sql.into());
        Ok(())
    }

    fn with_timeout<T>(
        &self,
        config: &SqlConfig,
        operation: impl FnOnce() -> RepoResult<T>,
    ) -> RepoResult<T> {
        let Some(timeout) = config.command_timeout() else {
            return operation();
        };
        self.conn.busy_timeout(timeout)?;
        let result = operation();
        self.conn.busy_timeout(self.default_timeout)?;
        result
    }

    fn prepare(&self, sql: &str, config: &SqlConfig) -> RepoResult<Statement<'c>> {
        let mut stmt = self.conn.prepare(&render::tagged(config.tag(), sql.to_string()))?;
        bind(&mut stmt, config)?;
        Ok(stmt)
    }

    fn run_statement(&self, kind: &str, sql: &str, config: &SqlConfig) -> RepoResult<u64> {
        let started_at = Instant::now();
        let changed = self.with_timeout(config, || {
            let mut stmt = self.prepare(sql, config)?;
            Ok(stmt.raw_execute()? as u64)
        })?;
        debug!(
            "event=sql_execute module=db status=ok kind={} tag={} rows={} duration_ms={}",
            kind,
            crate::logging::log_tag(config.tag()),
            changed,
            started_at.elapsed().as_millis()
        );
        Ok(changed)
    }
}

fn bind(stmt: &mut Statement<'_>, config: &SqlConfig) -> RepoResult<()> {
    let parameters = config.parameters();
    let positional = parameters
        .iter()
        .filter(|parameter| parameter.name().is_none())
        .count();
    if positional > 0 && parameters.len() != stmt.parameter_count() {
        return Err(RepoError::InvalidArgument(format!(
            "statement takes {} parameters, {} given",
            stmt.parameter_count(),
            parameters.len()
        )));
    }
    let mut position = 0;
    for parameter in parameters {
        let index = match parameter.name() {
            Some(name) => {
                let placeholder = if name.starts_with([':', '@', '$']) {
                    name.to_string()
                } else {
                    format!(":{name}")
                };
                stmt.parameter_index(&placeholder)?.ok_or_else(|| {
                    RepoError::InvalidArgument(format!(
                        "statement has no parameter `{placeholder}`"
                    ))
                })?
            }
            None => {
                position += 1;
                position
            }
        };
        stmt.raw_bind_parameter(index, parameter.value())?;
    }
    Ok(())
}

impl SqlExecutor for SqliteSqlExecutor<'_> {
    fn begin_transaction(&self) -> RepoResult<()> {
        if self.in_transaction() {
            return Err(RepoError::InvalidArgument(
                "a transaction is already open".to_string(),
            ));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        info!("event=sql_transaction module=db status=ok action=begin");
        Ok(())
    }

    fn commit_transaction(&self) -> RepoResult<()> {
        if !self.in_transaction() {
            return Err(RepoError::InvalidArgument(
                "no open transaction to commit".to_string(),
            ));
        }
        self.conn.execute_batch("COMMIT;")?;
        info!("event=sql_transaction module=db status=ok action=commit");
        Ok(())
    }

    fn rollback_transaction(&self) -> RepoResult<()> {
        if !self.in_transaction() {
            return Err(RepoError::InvalidArgument(
                "no open transaction to roll back".to_string(),
            ));
        }
        self.conn.execute_batch("ROLLBACK;")?;
        info!("event=sql_transaction module=db status=ok action=rollback");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn execute_raw_sql<T, F>(&self, sql: &str, mut map: F, config: &SqlConfig) -> RepoResult<Vec<T>>
    where
        F: FnMut(&Record) -> RepoResult<T>,
    {
        let started_at = Instant::now();
        let mapped = self.with_timeout(config, || {
            let mut stmt = self.prepare(sql, config)?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut rows = stmt.raw_query();
            let mut mapped = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Record::new();
                for (index, name) in names.iter().enumerate() {
                    record.insert(name.clone(), row.get::<_, Value>(index)?);
                }
                mapped.push(map(&record)?);
            }
            Ok(mapped)
        })?;
        debug!(
            "event=sql_execute module=db status=ok kind=query tag={} rows={} duration_ms={}",
            crate::logging::log_tag(config.tag()),
            mapped.len(),
            started_at.elapsed().as_millis()
        );
        Ok(mapped)
    }

    fn execute_command(&self, sql: &str, config: &SqlConfig) -> RepoResult<u64> {
        self.run_statement("command", sql, config)
    }

    fn execute_function<T: FromValue>(&self, name: &str, config: &SqlConfig) -> RepoResult<T> {
        if config
            .parameters()
            .iter()
            .any(|parameter| parameter.name().is_some())
        {
            return Err(RepoError::InvalidArgument(format!(
                "function `{name}` takes positional parameters only"
            )));
        }
        render::quote(name)?;
        let placeholders = vec!["?"; config.parameters().len()].join(", ");
        let sql = format!("SELECT {name}({placeholders})");
        let values = self.execute_raw_sql(
            &sql,
            |record| Ok(record.iter().next().map(|(_, value)| value.clone())),
            config,
        )?;
        let value = values.into_iter().flatten().next().unwrap_or(Value::Null);
        T::from_value(&value)
            .map_err(|message| RepoError::InvalidData(format!("function `{name}`: {message}")))
    }

    fn execute_procedure(&self, name: &str, config: &SqlConfig) -> RepoResult<u64> {
        let sql = self.procedures.get(name).ok_or_else(|| {
            RepoError::InvalidArgument(format!("procedure `{name}` is not registered"))
        })?;
        self.run_statement("procedure", sql, config)
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteSqlExecutor;
    use crate::config::StoreConfig;
    use crate::db::{open_db_in_memory, MigrationSet};
    use crate::model::value::Value;
    use crate::repo::error::RepoError;
    use crate::repo::sql::{ParamValue, SqlConfig, SqlExecutor};

    fn connection() -> rusqlite::Connection {
        let conn = open_db_in_memory(&StoreConfig::default(), &MigrationSet::empty())
            .expect("open in-memory db");
        conn.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER);")
            .expect("create table");
        conn
    }

    #[test]
    fn named_and_positional_parameters_bind() {
        let conn = connection();
        let sql = SqliteSqlExecutor::new(&conn, &StoreConfig::default());
        sql.execute_command(
            "INSERT INTO kv (k, v) VALUES (:k, :v)",
            &SqlConfig::new()
                .with_parameters([ParamValue::named("k", "a"), ParamValue::named("@v", 1)]),
        )
        .expect_err("`@v` is not a parameter of this statement");
        sql.execute_command(
            "INSERT INTO kv (k, v) VALUES (?, ?)",
            &SqlConfig::new().with_values([Value::from("b"), Value::from(2)]),
        )
        .expect("positional insert");
        let values = sql
            .execute_raw_sql(
                "SELECT v FROM kv WHERE k = :key",
                |record| record.read::<i64>("v"),
                &SqlConfig::new().with_parameters([ParamValue::named(":key", "b")]),
            )
            .expect("query");
        assert_eq!(values, vec![2]);
    }

    #[test]
    fn unknown_named_parameter_is_rejected() {
        let conn = connection();
        let sql = SqliteSqlExecutor::new(&conn, &StoreConfig::default());
        let err = sql
            .execute_command(
                "DELETE FROM kv WHERE k = :k",
                &SqlConfig::new().with_parameters([ParamValue::named("missing", 1)]),
            )
            .expect_err("unknown parameter");
        assert!(matches!(err, RepoError::InvalidArgument(_)));
    }

    #[test]
    fn functions_and_procedures_run() {
        let conn = connection();
        let mut sql = SqliteSqlExecutor::new(&conn, &StoreConfig::default());
        let absolute: i64 = sql
            .execute_function("abs", &SqlConfig::new().with_values([-4]))
            .expect("abs");
        assert_eq!(absolute, 4);

        sql.register_procedure("put", "INSERT INTO kv (k, v) VALUES (:k, :v)")
            .expect("register");
        let changed = sql
            .execute_procedure(
                "put",
                &SqlConfig::new()
                    .with_parameters([ParamValue::named("k", "p"), ParamValue::named("v", 9)]),
            )
            .expect("procedure");
        assert_eq!(changed, 1);
        assert!(matches!(
            sql.execute_procedure("nope", &SqlConfig::new()),
            Err(RepoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let conn = connection();
        let sql = SqliteSqlExecutor::new(&conn, &StoreConfig::default());
        let result: Result<(), RepoError> = sql.execute_transaction(|tx| {
            tx.execute_command(
                "INSERT INTO kv (k, v) VALUES ('t', 1)",
                &SqlConfig::new(),
            )?;
            Err(RepoError::InvalidArgument("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(!sql.in_transaction());

        let count: i64 = sql
            .execute_raw_sql(
                "SELECT COUNT(*) AS n FROM kv",
                |record| record.read::<i64>("n"),
                &SqlConfig::new().with_tag("audit count").expect("tag"),
            )
            .expect("count")[0];
        assert_eq!(count, 0);
        assert!(matches!(
            sql.commit_transaction(),
            Err(RepoError::InvalidArgument(_))
        ));
    }
}
