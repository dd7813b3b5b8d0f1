//! Write-path contracts.
//!
//! # Responsibility
//! - Declare change intent (`add`, `remove`, `modify`, `merge`,
//!   `track_item`) that a unit of work applies at commit.
//! - Run set-based changes (`delete_many`, `update_many`) immediately.
//!
//! # Invariants
//! - Intent methods never touch the store.
//! - Bulk methods are atomic and return the affected row count; `0` is a
//!   valid result, not an error.

use crate::model::entity::Entity;
use crate::model::value::Value;
use crate::query::spec::Spec;
use crate::repo::error::{RepoError, RepoResult};

/// Column assignments applied by `update_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    assignments: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the assignment for `column`.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self
            .assignments
            .iter_mut()
            .find(|(existing, _)| *existing == column)
        {
            Some(slot) => slot.1 = value,
            None => self.assignments.push((column, value)),
        }
        self
    }

    pub fn assignments(&self) -> &[(String, Value)] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Rejects empty updates, unknown columns and writes to the key.
    pub fn validate<E: Entity>(&self) -> RepoResult<()> {
        let schema = E::schema();
        if self.assignments.is_empty() {
            return Err(RepoError::InvalidArgument(
                "update must assign at least one column".to_string(),
            ));
        }
        for (column, _) in &self.assignments {
            if column == schema.key {
                return Err(RepoError::InvalidArgument(format!(
                    "update cannot assign key column `{column}` of `{}`",
                    schema.table
                )));
            }
            if !schema.has_column(column) {
                return Err(RepoError::InvalidArgument(format!(
                    "`{}` has no column `{column}`",
                    schema.table
                )));
            }
        }
        Ok(())
    }

    /// Applies the assignments to an in-memory entity.
    pub fn apply_to<E: Entity>(&self, entity: &E) -> RepoResult<E> {
        let mut record = entity.to_record();
        for (column, value) in &self.assignments {
            record.insert(column.clone(), value.clone());
        }
        E::from_record(&record)
    }
}

/// Write capability over entities of type `E`.
pub trait Writer<E: Entity> {
    fn add(&self, item: E) -> RepoResult<()>;

    fn remove(&self, item: &E) -> RepoResult<()>;

    fn modify(&self, item: &E) -> RepoResult<()>;

    /// Records `current` as the new state of the persisted entity.
    fn merge(&self, persisted: &E, current: &E) -> RepoResult<()> {
        let mut merged = current.clone();
        merged.set_key(persisted.key());
        self.modify(&merged)
    }

    /// Starts tracking `item` as unchanged.
    fn track_item(&self, item: &E) -> RepoResult<()>;

    fn delete_many(&self, spec: Spec<E>) -> RepoResult<u64>;

    fn update_many(&self, spec: Spec<E>, update: &Update) -> RepoResult<u64>;
}
