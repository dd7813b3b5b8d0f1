//! Entity contract, static schema description and column records.
//!
//! # Responsibility
//! - Describe how a Rust record type maps onto a keyed table.
//! - Provide the column-level view (`field`, `Record`) that filters, sorting
//!   and persistence adapters work against.
//!
//! # Invariants
//! - Identity is defined solely by `Entity::key`.
//! - `EntitySchema::columns` lists every column `field` can answer,
//!   including the key column.
//! - The row-version column, when declared, is owned by the persistence
//!   adapter and never appears in `columns`.

use crate::model::value::{FromValue, KeyValue, Value};
use crate::repo::error::{RepoError, RepoResult};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Columns stamped when a commit carries audit metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditColumns {
    pub created_by: &'static str,
    pub created_at: &'static str,
    pub updated_by: &'static str,
    pub updated_at: &'static str,
}

/// Related-data path that can be requested as a load hint.
///
/// Related rows are those of `table` whose `foreign_key` equals the parent
/// key. They are delivered ordered by the first entry of `columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub name: &'static str,
    pub table: &'static str,
    pub foreign_key: &'static str,
    pub columns: &'static [&'static str],
}

/// Static table mapping of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
    /// Optimistic concurrency token column.
    pub version: Option<&'static str>,
    pub audit: Option<AuditColumns>,
    pub navigations: &'static [Navigation],
}

impl EntitySchema {
    /// Returns whether `column` is a declared entity column.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|known| *known == column)
    }

    pub fn navigation(&self, name: &str) -> Option<&'static Navigation> {
        self.navigations.iter().find(|nav| nav.name == name)
    }

    /// Columns read back from storage: entity columns plus the version token.
    pub fn stored_columns(&self) -> Vec<&'static str> {
        let mut columns = self.columns.to_vec();
        if let Some(version) = self.version {
            columns.push(version);
        }
        columns
    }
}

/// Column name to value map for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    cells: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.cells.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.cells.iter()
    }

    /// Reads one typed column, failing with `InvalidData` when the column is
    /// absent or holds a value of the wrong type.
    pub fn read<T: FromValue>(&self, column: &str) -> RepoResult<T> {
        let value = self
            .cells
            .get(column)
            .ok_or_else(|| RepoError::InvalidData(format!("missing column `{column}`")))?;
        T::from_value(value)
            .map_err(|message| RepoError::InvalidData(format!("column `{column}`: {message}")))
    }

    /// Like `read`, but an absent column reads as `Null`.
    pub fn read_or_null<T: FromValue>(&self, column: &str) -> RepoResult<T> {
        match self.cells.get(column) {
            Some(_) => self.read(column),
            None => T::from_value(&Value::Null).map_err(|message| {
                RepoError::InvalidData(format!("column `{column}`: {message}"))
            }),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// A keyed record type managed by repositories.
pub trait Entity: Clone + Debug + 'static {
    type Key: Clone + Debug + PartialEq + Into<Value>;

    fn schema() -> &'static EntitySchema;

    fn key(&self) -> Self::Key;

    fn set_key(&mut self, key: Self::Key);

    /// Returns the value of a declared column, `None` for unknown columns.
    fn field(&self, column: &str) -> Option<Value>;

    fn from_record(record: &Record) -> RepoResult<Self>;

    /// Projects every declared column into a record.
    fn to_record(&self) -> Record {
        Self::schema()
            .columns
            .iter()
            .filter_map(|column| {
                self.field(column)
                    .map(|value| ((*column).to_string(), value))
            })
            .collect()
    }

    /// Receives related rows for a requested load hint.
    fn attach(&mut self, navigation: &str, _related: Vec<Record>) -> RepoResult<()> {
        Err(RepoError::InvalidArgument(format!(
            "entity `{}` cannot attach navigation `{navigation}`",
            Self::schema().table
        )))
    }
}

/// Converts an entity key into its hashable form.
pub fn key_of<E: Entity>(key: &E::Key) -> RepoResult<KeyValue> {
    let value: Value = key.clone().into();
    KeyValue::from_value(&value).ok_or_else(|| {
        RepoError::InvalidArgument(format!(
            "value {value} cannot be used as a key of `{}`",
            E::schema().table
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{key_of, Entity, EntitySchema, Record};
    use crate::model::value::{KeyValue, Value};
    use crate::repo::error::{RepoError, RepoResult};

    static TAG_SCHEMA: EntitySchema = EntitySchema {
        table: "tags",
        key: "slug",
        columns: &["slug", "label"],
        version: None,
        audit: None,
        navigations: &[],
    };

    #[derive(Debug, Clone)]
    struct Tag {
        slug: String,
        label: Option<String>,
    }

    impl Entity for Tag {
        type Key = String;

        fn schema() -> &'static EntitySchema {
            &TAG_SCHEMA
        }

        fn key(&self) -> String {
            self.slug.clone()
        }

        fn set_key(&mut self, key: String) {
            self.slug = key;
        }

        fn field(&self, column: &str) -> Option<Value> {
            match column {
                "slug" => Some(self.slug.as_str().into()),
                "label" => Some(self.label.clone().into()),
                _ => None,
            }
        }

        fn from_record(record: &Record) -> RepoResult<Self> {
            Ok(Self {
                slug: record.read("slug")?,
                label: record.read_or_null("label")?,
            })
        }
    }

    #[test]
    fn entities_without_navigations_reject_attach() {
        let mut tag = Tag {
            slug: "rust".to_string(),
            label: None,
        };
        let err = tag
            .attach("posts", vec![Record::new().with("id", 1)])
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::InvalidArgument(ref message) if message.contains("posts")
        ));
    }

    #[test]
    fn to_record_covers_declared_columns() {
        let tag = Tag {
            slug: "rust".to_string(),
            label: None,
        };
        let record = tag.to_record();
        assert_eq!(record.get("slug"), Some(&Value::from("rust")));
        assert_eq!(record.get("label"), Some(&Value::Null));
        assert_eq!(
            key_of::<Tag>(&tag.key()).unwrap(),
            KeyValue::Text("rust".to_string())
        );
    }
}
