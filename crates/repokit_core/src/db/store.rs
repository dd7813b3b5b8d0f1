//! Statement-level operations shared by the SQLite unit of work, set and
//! executor.
//!
//! # Invariants
//! - Multi-statement writes go through `atomically`, a savepoint, so they
//!   nest inside caller transactions.
//! - A plan's selection must translate; its after filter runs in memory on
//!   the loaded page, after load hints.

use crate::db::render::{self, SqlFragment};
use crate::model::entity::{Entity, EntitySchema, Navigation, Record};
use crate::model::value::Value;
use crate::query::filter::Filter;
use crate::query::plan::QueryPlan;
use crate::query::sort::SortSequence;
use crate::query::spec::{Spec, Specification};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::write::Update;
use log::{debug, warn};
use rusqlite::{params_from_iter, Connection};
use std::cmp::Ordering;
use std::time::Instant;

const SAVEPOINT: &str = "repokit_write";

/// One loaded entity with the stored row it came from.
pub(crate) struct Loaded<E> {
    pub entity: E,
    pub record: Record,
    pub version: Option<i64>,
}

/// Runs `operation` inside a savepoint: released on `Ok`, rolled back on
/// `Err`. A release that fails (a deferred constraint, a busy outer commit)
/// rolls the savepoint back too, so the connection never stays inside it.
pub(crate) fn atomically<T>(
    conn: &Connection,
    operation: impl FnOnce() -> RepoResult<T>,
) -> RepoResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT};"))?;
    let result = operation();
    let released = match &result {
        Ok(_) => conn.execute_batch(&format!("RELEASE {SAVEPOINT};")),
        Err(_) => Ok(()),
    };
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => {
            discard_savepoint(conn);
            Err(release_err.into())
        }
        (Err(err), _) => {
            discard_savepoint(conn);
            Err(err)
        }
    }
}

fn discard_savepoint(conn: &Connection) {
    if let Err(rollback_err) =
        conn.execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT};"))
    {
        warn!(
            "event=savepoint_rollback module=db status=error error={}",
            rollback_err
        );
    }
}

pub(crate) fn query_records(
    conn: &Connection,
    fragment: &SqlFragment,
    tag: Option<&str>,
) -> RepoResult<Vec<Record>> {
    let mut stmt = conn.prepare(&render::tagged(tag, fragment.sql.clone()))?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params_from_iter(fragment.params.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (index, name) in names.iter().enumerate() {
            record.insert(name.clone(), row.get::<_, Value>(index)?);
        }
        records.push(record);
    }
    Ok(records)
}

fn query_scalar(
    conn: &Connection,
    fragment: &SqlFragment,
    tag: Option<&str>,
) -> RepoResult<i64> {
    let value = conn.query_row(
        &render::tagged(tag, fragment.sql.clone()),
        params_from_iter(fragment.params.iter()),
        |row| row.get::<_, i64>(0),
    )?;
    Ok(value)
}

fn execute(conn: &Connection, fragment: &SqlFragment, tag: Option<&str>) -> RepoResult<u64> {
    let changed = conn.execute(
        &render::tagged(tag, fragment.sql.clone()),
        params_from_iter(fragment.params.iter()),
    )?;
    Ok(changed as u64)
}

/// Splits the version column off a stored row.
fn split_version(schema: &EntitySchema, mut record: Record) -> RepoResult<(Record, Option<i64>)> {
    let version = match schema.version {
        Some(column) => {
            let version = record.read_or_null::<Option<i64>>(column)?;
            record.remove(column);
            version
        }
        None => None,
    };
    Ok((record, version))
}

fn check_window<E: Entity>(plan: &QueryPlan<E>, max_page_size: Option<u64>) -> RepoResult<()> {
    if let (Some(window), Some(max)) = (plan.window(), max_page_size) {
        if window.take > max {
            return Err(RepoError::InvalidArgument(format!(
                "page size {} exceeds the configured maximum {max}",
                window.take
            )));
        }
    }
    Ok(())
}

fn selection<E: Entity>(plan: &QueryPlan<E>) -> RepoResult<Option<Filter>> {
    Ok(plan
        .selection()
        .map(|spec| spec.to_filter())
        .transpose()?)
}

/// Runs the filter, sort, page, load-hint and after stages of `plan`.
pub(crate) fn load_plan<E: Entity>(
    conn: &Connection,
    plan: &QueryPlan<E>,
    max_page_size: Option<u64>,
) -> RepoResult<Vec<Loaded<E>>> {
    let started_at = Instant::now();
    check_window(plan, max_page_size)?;
    let schema = E::schema();
    let filter = selection(plan)?;
    let fragment = render::select(schema, filter.as_ref(), plan.sorting(), plan.window())?;

    let mut loaded = Vec::new();
    for row in query_records(conn, &fragment, plan.tag())? {
        let (record, version) = split_version(schema, row)?;
        loaded.push(Loaded {
            entity: E::from_record(&record)?,
            record,
            version,
        });
    }

    for path in plan.includes() {
        let navigation = schema.navigation(path).ok_or_else(|| {
            RepoError::InvalidArgument(format!("`{}` has no navigation `{path}`", schema.table))
        })?;
        attach_related(conn, navigation, &mut loaded, plan.tag())?;
    }

    if let Some(post) = plan.post_filter() {
        loaded.retain(|row| post.is_satisfied_by(&row.entity));
    }

    debug!(
        "event=query_execute module=db status=ok table={} tag={} rows={} duration_ms={}",
        schema.table,
        crate::logging::log_tag(plan.tag()),
        loaded.len(),
        started_at.elapsed().as_millis()
    );
    Ok(loaded)
}

fn attach_related<E: Entity>(
    conn: &Connection,
    navigation: &Navigation,
    loaded: &mut [Loaded<E>],
    tag: Option<&str>,
) -> RepoResult<()> {
    if loaded.is_empty() {
        return Ok(());
    }
    let parents: Vec<Value> = loaded.iter().map(|row| row.entity.key().into()).collect();
    let related = related_records(conn, navigation, parents, None, tag)?;
    for row in loaded.iter_mut() {
        let children = children_of(navigation, &related, &row.entity.key().into());
        row.entity.attach(navigation.name, children)?;
    }
    Ok(())
}

fn related_records(
    conn: &Connection,
    navigation: &Navigation,
    parents: Vec<Value>,
    narrow: Option<&Filter>,
    tag: Option<&str>,
) -> RepoResult<Vec<Record>> {
    let fragment = render::related(
        navigation.table,
        navigation.foreign_key,
        navigation.columns,
        parents,
        narrow,
    )?;
    query_records(conn, &fragment, tag)
}

fn children_of(navigation: &Navigation, related: &[Record], parent: &Value) -> Vec<Record> {
    related
        .iter()
        .filter(|record| {
            record
                .get(navigation.foreign_key)
                .and_then(|value| value.filter_cmp(parent))
                == Some(Ordering::Equal)
        })
        .cloned()
        .collect()
}

/// Loads navigation `name` onto one entity already in hand, keeping only
/// related rows that match `narrow`. Returns the number of rows attached.
pub(crate) fn load_navigation<E: Entity>(
    conn: &Connection,
    entity: &mut E,
    name: &str,
    narrow: Option<&Filter>,
) -> RepoResult<usize> {
    let schema = E::schema();
    let navigation = schema.navigation(name).ok_or_else(|| {
        RepoError::InvalidArgument(format!("`{}` has no navigation `{name}`", schema.table))
    })?;
    let parent: Value = entity.key().into();
    let related = related_records(conn, navigation, vec![parent.clone()], narrow, None)?;
    let children = children_of(navigation, &related, &parent);
    let attached = children.len();
    entity.attach(navigation.name, children)?;
    debug!(
        "event=navigation_load module=db status=ok table={} navigation={} rows={}",
        schema.table, navigation.name, attached
    );
    Ok(attached)
}

pub(crate) fn count_plan<E: Entity>(
    conn: &Connection,
    plan: &QueryPlan<E>,
    max_page_size: Option<u64>,
) -> RepoResult<u64> {
    if plan.post_filter().is_some() {
        return Ok(load_plan(conn, plan, max_page_size)?.len() as u64);
    }
    check_window(plan, max_page_size)?;
    let filter = selection(plan)?;
    let fragment = render::count(E::schema(), filter.as_ref(), plan.sorting(), plan.window())?;
    Ok(query_scalar(conn, &fragment, plan.tag())?.unsigned_abs())
}

pub(crate) fn exists_plan<E: Entity>(
    conn: &Connection,
    plan: &QueryPlan<E>,
    max_page_size: Option<u64>,
) -> RepoResult<bool> {
    if plan.post_filter().is_some() {
        return Ok(!load_plan(conn, plan, max_page_size)?.is_empty());
    }
    check_window(plan, max_page_size)?;
    let filter = selection(plan)?;
    let fragment = render::exists(E::schema(), filter.as_ref(), plan.sorting(), plan.window())?;
    Ok(query_scalar(conn, &fragment, plan.tag())? != 0)
}

pub(crate) fn all_plan<E: Entity>(
    conn: &Connection,
    plan: &QueryPlan<E>,
    spec: &Spec<E>,
    max_page_size: Option<u64>,
) -> RepoResult<bool> {
    if plan.post_filter().is_some() {
        return Ok(load_plan(conn, plan, max_page_size)?
            .iter()
            .all(|row| spec.is_satisfied_by(&row.entity)));
    }
    check_window(plan, max_page_size)?;
    let filter = selection(plan)?;
    let predicate = spec.to_filter()?;
    let fragment = render::all(
        E::schema(),
        filter.as_ref(),
        plan.sorting(),
        plan.window(),
        &predicate,
    )?;
    Ok(query_scalar(conn, &fragment, plan.tag())? != 0)
}

/// Current stored row and version for `key`, if the row exists.
pub(crate) fn reload(
    conn: &Connection,
    schema: &EntitySchema,
    key: &Value,
) -> RepoResult<Option<(Record, Option<i64>)>> {
    let filter = Filter::eq(schema.key, key.clone());
    let fragment = render::select(schema, Some(&filter), &SortSequence::new(), None)?;
    match query_records(conn, &fragment, None)?.into_iter().next() {
        Some(row) => Ok(Some(split_version(schema, row)?)),
        None => Ok(None),
    }
}

/// Stored version of `key`: `None` when the row is gone.
pub(crate) fn read_version(
    conn: &Connection,
    schema: &EntitySchema,
    key: &Value,
) -> RepoResult<Option<Option<i64>>> {
    let Some(version) = schema.version else {
        return Ok(reload(conn, schema, key)?.map(|_| None));
    };
    let sql = render::select_version(schema, version)?;
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get::<_, Option<i64>>(0)?)),
        None => Ok(None),
    }
}

/// Column cells of `record` in schema order, key included.
fn cells(schema: &EntitySchema, record: &Record, with_key: bool) -> Vec<(String, Value)> {
    schema
        .columns
        .iter()
        .filter(|column| with_key || **column != schema.key)
        .filter_map(|column| {
            record
                .get(column)
                .map(|value| ((*column).to_string(), value.clone()))
        })
        .collect()
}

/// Inserts one row; returns its initial version.
pub(crate) fn insert_row(
    conn: &Connection,
    schema: &EntitySchema,
    record: &Record,
) -> RepoResult<Option<i64>> {
    let mut row = cells(schema, record, true);
    let version = schema.version.map(|column| {
        row.push((column.to_string(), Value::Integer(1)));
        1
    });
    execute(conn, &render::insert(schema.table, row)?, None)?;
    Ok(version)
}

/// Updates one row by key; returns the number of rows changed. Creation
/// audit columns are only ever written on insert.
pub(crate) fn update_row(
    conn: &Connection,
    schema: &EntitySchema,
    record: &Record,
    key: Value,
    expected_version: Option<i64>,
) -> RepoResult<u64> {
    let mut row = cells(schema, record, false);
    if let Some(audit) = schema.audit {
        row.retain(|(column, _)| column != audit.created_by && column != audit.created_at);
    }
    if row.is_empty() && schema.version.is_none() {
        return Ok(0);
    }
    let fragment = render::update_row(schema, row, key, expected_version)?;
    execute(conn, &fragment, None)
}

pub(crate) fn delete_row(
    conn: &Connection,
    schema: &EntitySchema,
    key: Value,
    expected_version: Option<i64>,
) -> RepoResult<u64> {
    execute(
        conn,
        &render::delete_row(schema, key, expected_version)?,
        None,
    )
}

/// Set-based delete; atomic, returns affected rows.
pub(crate) fn delete_many<E: Entity>(conn: &Connection, spec: &Spec<E>) -> RepoResult<u64> {
    let started_at = Instant::now();
    let schema = E::schema();
    let filter = spec.to_filter()?;
    let fragment = render::delete_where(schema, &filter)?;
    let affected = atomically(conn, || execute(conn, &fragment, None))?;
    debug!(
        "event=bulk_delete module=db status=ok table={} rows={} duration_ms={}",
        schema.table,
        affected,
        started_at.elapsed().as_millis()
    );
    Ok(affected)
}

/// Set-based update; bumps the version of every affected row.
pub(crate) fn update_many<E: Entity>(
    conn: &Connection,
    spec: &Spec<E>,
    update: &Update,
) -> RepoResult<u64> {
    let started_at = Instant::now();
    update.validate::<E>()?;
    let schema = E::schema();
    let filter = spec.to_filter()?;
    let fragment = render::update_where(schema, update.assignments().to_vec(), &filter)?;
    let affected = atomically(conn, || execute(conn, &fragment, None))?;
    debug!(
        "event=bulk_update module=db status=ok table={} rows={} duration_ms={}",
        schema.table,
        affected,
        started_at.elapsed().as_millis()
    );
    Ok(affected)
}
