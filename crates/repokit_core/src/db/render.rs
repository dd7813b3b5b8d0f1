//! SQL text generation for filters, plans and row writes.
//!
//! # Invariants
//! - Identifiers are validated and double-quoted; values are always bound
//!   as parameters, never inlined.
//! - Every rendered predicate is two-valued (0 or 1, never NULL), so `NOT`
//!   agrees with in-memory evaluation.
//! - Nulls sort last in both directions; the key column ascending is the
//!   final tie-break.

use crate::model::entity::EntitySchema;
use crate::model::value::Value;
use crate::query::filter::{Filter, TextOp};
use crate::query::paging::PagingWindow;
use crate::query::sort::SortSequence;
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }
}

pub(crate) fn quote(identifier: &str) -> RepoResult<String> {
    if !IDENTIFIER.is_match(identifier) {
        return Err(RepoError::InvalidArgument(format!(
            "`{identifier}` is not a valid SQL identifier"
        )));
    }
    Ok(format!("\"{identifier}\""))
}

/// Prefixes `sql` with the tag as a single-line comment.
pub(crate) fn tagged(tag: Option<&str>, sql: String) -> String {
    match tag {
        Some(tag) => {
            let line = crate::logging::sanitize_message(tag, crate::logging::MAX_TAG_CHARS);
            format!("-- {line}\n{sql}")
        }
        None => sql,
    }
}

pub(crate) fn render_filter(filter: &Filter, out: &mut SqlFragment) -> RepoResult<()> {
    match filter {
        Filter::True => out.push("1"),
        Filter::False => out.push("0"),
        Filter::Compare { column, op, value } => {
            if value.is_null() {
                out.push("0");
            } else {
                out.push(&format!("COALESCE({} {} ", quote(column)?, op.sql()));
                out.bind(value.clone());
                out.push(", 0)");
            }
        }
        Filter::In { column, values } => {
            let values = non_null(values);
            if values.is_empty() {
                out.push("0");
            } else {
                out.push(&format!("COALESCE({} IN (", quote(column)?));
                bind_list(out, values);
                out.push("), 0)");
            }
        }
        Filter::NotIn { column, values } => {
            let values = non_null(values);
            if values.is_empty() {
                out.push(&format!("({} IS NOT NULL)", quote(column)?));
            } else {
                out.push(&format!("COALESCE({} NOT IN (", quote(column)?));
                bind_list(out, values);
                out.push("), 0)");
            }
        }
        Filter::Text {
            column,
            op,
            pattern,
        } => {
            let column = quote(column)?;
            let empty = pattern.is_empty();
            let pattern = Value::Text(pattern.clone());
            out.push(&format!("COALESCE(typeof({column}) = 'text' AND "));
            match op {
                TextOp::Contains => {
                    out.push(&format!("instr({column}, "));
                    out.bind(pattern);
                    out.push(") > 0");
                }
                TextOp::StartsWith => {
                    out.push(&format!("substr({column}, 1, length("));
                    out.bind(pattern.clone());
                    out.push(")) = ");
                    out.bind(pattern);
                }
                TextOp::EndsWith if empty => {
                    out.push("1");
                }
                TextOp::EndsWith => {
                    out.push(&format!("substr({column}, -length("));
                    out.bind(pattern.clone());
                    out.push(")) = ");
                    out.bind(pattern);
                }
            }
            out.push(", 0)");
        }
        Filter::IsNull { column } => out.push(&format!("({} IS NULL)", quote(column)?)),
        Filter::IsNotNull { column } => out.push(&format!("({} IS NOT NULL)", quote(column)?)),
        Filter::And(items) => render_junction(items, " AND ", "1", out)?,
        Filter::Or(items) => render_junction(items, " OR ", "0", out)?,
        Filter::Not(inner) => {
            out.push("(NOT ");
            render_filter(inner, out)?;
            out.push(")");
        }
    }
    Ok(())
}

fn non_null(values: &[Value]) -> Vec<Value> {
    values
        .iter()
        .filter(|value| !value.is_null())
        .cloned()
        .collect()
}

fn bind_list(out: &mut SqlFragment, values: Vec<Value>) {
    for (index, value) in values.into_iter().enumerate() {
        if index > 0 {
            out.push(", ");
        }
        out.bind(value);
    }
}

fn render_junction(
    items: &[Filter],
    separator: &str,
    empty: &str,
    out: &mut SqlFragment,
) -> RepoResult<()> {
    if items.is_empty() {
        out.push(empty);
        return Ok(());
    }
    out.push("(");
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push(separator);
        }
        render_filter(item, out)?;
    }
    out.push(")");
    Ok(())
}

fn column_list(columns: &[&str]) -> RepoResult<String> {
    Ok(columns
        .iter()
        .map(|column| quote(column))
        .collect::<RepoResult<Vec<_>>>()?
        .join(", "))
}

fn order_by(schema: &EntitySchema, sorting: &SortSequence) -> RepoResult<String> {
    let mut terms = Vec::with_capacity(sorting.len() + 1);
    for directive in sorting {
        terms.push(format!(
            "{} {} NULLS LAST",
            quote(&directive.column)?,
            directive.direction.sql()
        ));
    }
    terms.push(format!("{} ASC", quote(schema.key)?));
    Ok(terms.join(", "))
}

fn window_clause(window: Option<PagingWindow>, out: &mut SqlFragment) {
    if let Some(window) = window {
        out.push(" LIMIT ");
        out.bind(Value::Integer(i64::try_from(window.take).unwrap_or(i64::MAX)));
        out.push(" OFFSET ");
        out.bind(Value::Integer(i64::try_from(window.skip).unwrap_or(i64::MAX)));
    }
}

/// Filter, sort and page stages as one SELECT over the stored columns.
pub(crate) fn select(
    schema: &EntitySchema,
    selection: Option<&Filter>,
    sorting: &SortSequence,
    window: Option<PagingWindow>,
) -> RepoResult<SqlFragment> {
    let mut out = SqlFragment::default();
    out.push(&format!(
        "SELECT {} FROM {} WHERE ",
        column_list(&schema.stored_columns())?,
        quote(schema.table)?
    ));
    render_filter(selection.unwrap_or(&Filter::True), &mut out)?;
    out.push(&format!(" ORDER BY {}", order_by(schema, sorting)?));
    window_clause(window, &mut out);
    Ok(out)
}

/// Number of rows the selection yields.
pub(crate) fn count(
    schema: &EntitySchema,
    selection: Option<&Filter>,
    sorting: &SortSequence,
    window: Option<PagingWindow>,
) -> RepoResult<SqlFragment> {
    let inner = select(schema, selection, sorting, window)?;
    Ok(SqlFragment {
        sql: format!("SELECT COUNT(*) FROM ({}) AS page", inner.sql),
        params: inner.params,
    })
}

pub(crate) fn exists(
    schema: &EntitySchema,
    selection: Option<&Filter>,
    sorting: &SortSequence,
    window: Option<PagingWindow>,
) -> RepoResult<SqlFragment> {
    let inner = select(schema, selection, sorting, window)?;
    Ok(SqlFragment {
        sql: format!("SELECT EXISTS({})", inner.sql),
        params: inner.params,
    })
}

/// Whether every selected row satisfies `predicate`.
pub(crate) fn all(
    schema: &EntitySchema,
    selection: Option<&Filter>,
    sorting: &SortSequence,
    window: Option<PagingWindow>,
    predicate: &Filter,
) -> RepoResult<SqlFragment> {
    let mut out = select(schema, selection, sorting, window)?;
    out.sql = format!("SELECT NOT EXISTS(SELECT 1 FROM ({}) AS page WHERE NOT ", out.sql);
    render_filter(predicate, &mut out)?;
    out.push(")");
    Ok(out)
}

/// Related rows of `table` whose `foreign_key` is one of `parents`.
pub(crate) fn related(
    table: &str,
    foreign_key: &str,
    columns: &[&str],
    parents: Vec<Value>,
    narrow: Option<&Filter>,
) -> RepoResult<SqlFragment> {
    let mut selected: Vec<&str> = columns.to_vec();
    if !selected.contains(&foreign_key) {
        selected.push(foreign_key);
    }
    let mut out = SqlFragment::default();
    out.push(&format!(
        "SELECT {} FROM {} WHERE {} IN (",
        column_list(&selected)?,
        quote(table)?,
        quote(foreign_key)?
    ));
    bind_list(&mut out, parents);
    out.push(")");
    if let Some(narrow) = narrow {
        out.push(" AND ");
        render_filter(narrow, &mut out)?;
    }
    if let Some(first) = columns.first() {
        out.push(&format!(" ORDER BY {} ASC", quote(first)?));
    }
    Ok(out)
}

pub(crate) fn insert(table: &str, cells: Vec<(String, Value)>) -> RepoResult<SqlFragment> {
    let names: Vec<&str> = cells.iter().map(|(column, _)| column.as_str()).collect();
    let mut out = SqlFragment::default();
    out.push(&format!(
        "INSERT INTO {} ({}) VALUES (",
        quote(table)?,
        column_list(&names)?
    ));
    bind_list(&mut out, cells.into_iter().map(|(_, value)| value).collect());
    out.push(")");
    Ok(out)
}

/// UPDATE of one row by key, bumping the version column when declared.
/// With `expected_version`, a stale row matches nothing.
pub(crate) fn update_row(
    schema: &EntitySchema,
    cells: Vec<(String, Value)>,
    key: Value,
    expected_version: Option<i64>,
) -> RepoResult<SqlFragment> {
    let mut out = SqlFragment::default();
    out.push(&format!("UPDATE {} SET ", quote(schema.table)?));
    assignments(schema, cells, &mut out)?;
    out.push(&format!(" WHERE {} = ", quote(schema.key)?));
    out.bind(key);
    version_guard(schema, expected_version, &mut out)?;
    Ok(out)
}

pub(crate) fn delete_row(
    schema: &EntitySchema,
    key: Value,
    expected_version: Option<i64>,
) -> RepoResult<SqlFragment> {
    let mut out = SqlFragment::default();
    out.push(&format!(
        "DELETE FROM {} WHERE {} = ",
        quote(schema.table)?,
        quote(schema.key)?
    ));
    out.bind(key);
    version_guard(schema, expected_version, &mut out)?;
    Ok(out)
}

pub(crate) fn delete_where(schema: &EntitySchema, filter: &Filter) -> RepoResult<SqlFragment> {
    let mut out = SqlFragment::default();
    out.push(&format!("DELETE FROM {} WHERE ", quote(schema.table)?));
    render_filter(filter, &mut out)?;
    Ok(out)
}

pub(crate) fn update_where(
    schema: &EntitySchema,
    cells: Vec<(String, Value)>,
    filter: &Filter,
) -> RepoResult<SqlFragment> {
    let mut out = SqlFragment::default();
    out.push(&format!("UPDATE {} SET ", quote(schema.table)?));
    assignments(schema, cells, &mut out)?;
    out.push(" WHERE ");
    render_filter(filter, &mut out)?;
    Ok(out)
}

/// Reads the version column of one row.
pub(crate) fn select_version(schema: &EntitySchema, version: &str) -> RepoResult<String> {
    Ok(format!(
        "SELECT {} FROM {} WHERE {} = ?",
        quote(version)?,
        quote(schema.table)?,
        quote(schema.key)?
    ))
}

fn assignments(
    schema: &EntitySchema,
    cells: Vec<(String, Value)>,
    out: &mut SqlFragment,
) -> RepoResult<()> {
    for (index, (column, value)) in cells.into_iter().enumerate() {
        if index > 0 {
            out.push(", ");
        }
        out.push(&format!("{} = ", quote(&column)?));
        out.bind(value);
    }
    if let Some(version) = schema.version {
        let version = quote(version)?;
        out.push(&format!(", {version} = COALESCE({version}, 0) + 1"));
    }
    Ok(())
}

fn version_guard(
    schema: &EntitySchema,
    expected_version: Option<i64>,
    out: &mut SqlFragment,
) -> RepoResult<()> {
    if let (Some(version), Some(expected)) = (schema.version, expected_version) {
        out.push(&format!(" AND {} = ", quote(version)?));
        out.bind(Value::Integer(expected));
    }
    Ok(())
}
