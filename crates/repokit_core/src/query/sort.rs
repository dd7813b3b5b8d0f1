//! Sort directives and the stable in-memory sort applier.
//!
//! # Invariants
//! - The first directive is the primary key; later ones only break ties.
//! - Sorting is stable: rows equal under every directive keep input order.
//! - Nulls sort last in both directions.

use crate::model::entity::Entity;
use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One `(column, direction)` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub column: String,
    pub direction: SortDirection,
}

impl Sorting {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Ordered list of sort directives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSequence {
    directives: Vec<Sorting>,
}

impl SortSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a lower-precedence directive.
    pub fn then(mut self, sorting: Sorting) -> Self {
        self.directives.push(sorting);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sorting> {
        self.directives.iter()
    }

    /// Rejects directives on columns `E` does not declare.
    pub fn validate<E: Entity>(&self) -> RepoResult<()> {
        let schema = E::schema();
        for sorting in &self.directives {
            if !schema.has_column(&sorting.column) {
                return Err(RepoError::InvalidArgument(format!(
                    "cannot sort `{}` by unknown column `{}`",
                    schema.table, sorting.column
                )));
            }
        }
        Ok(())
    }

    /// Compares two entities under this sequence.
    pub fn compare<E: Entity>(&self, left: &E, right: &E) -> Ordering {
        for sorting in &self.directives {
            let a = left.field(&sorting.column).unwrap_or(Value::Null);
            let b = right.field(&sorting.column).unwrap_or(Value::Null);
            let ordering = match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => match sorting.direction {
                    SortDirection::Ascending => a.total_cmp(&b),
                    SortDirection::Descending => b.total_cmp(&a),
                },
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Sorts in place; a no-op for an empty sequence.
    pub fn apply<E: Entity>(&self, items: &mut [E]) {
        if self.directives.is_empty() {
            return;
        }
        items.sort_by(|left, right| self.compare(left, right));
    }
}

impl FromIterator<Sorting> for SortSequence {
    fn from_iter<I: IntoIterator<Item = Sorting>>(iter: I) -> Self {
        Self {
            directives: iter.into_iter().collect(),
        }
    }
}

impl From<Sorting> for SortSequence {
    fn from(value: Sorting) -> Self {
        Self {
            directives: vec![value],
        }
    }
}

impl<'a> IntoIterator for &'a SortSequence {
    type Item = &'a Sorting;
    type IntoIter = std::slice::Iter<'a, Sorting>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.iter()
    }
}
