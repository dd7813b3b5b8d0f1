//! In-process set used as the reference backend.
//!
//! # Invariants
//! - Entities keep insertion order; that is the default order of queries
//!   without sort directives.
//! - Keys are unique inside one set.
//! - Opaque predicates are allowed everywhere since nothing is translated.

use crate::model::entity::{key_of, Entity, Record};
use crate::model::value::{KeyValue, Value};
use crate::query::plan::QueryPlan;
use crate::query::spec::{Spec, Specification};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::read::Reader;
use crate::repo::set::EntitySet;
use crate::repo::write::Update;
use std::cell::RefCell;
use std::cmp::Ordering;

/// Vector-backed `EntitySet` and `Reader`.
#[derive(Debug)]
pub struct MemorySet<E> {
    items: RefCell<Vec<E>>,
    related: RefCell<Vec<(&'static str, Record)>>,
}

impl<E: Entity> Default for MemorySet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemorySet<E> {
    pub fn new() -> Self {
        Self {
            items: RefCell::new(Vec::new()),
            related: RefCell::new(Vec::new()),
        }
    }

    /// Builds a set from `items`, rejecting duplicate keys.
    pub fn with_items(items: impl IntoIterator<Item = E>) -> RepoResult<Self> {
        let set = Self::new();
        for item in items {
            set.insert(item)?;
        }
        Ok(set)
    }

    /// Registers related rows served for load hint `navigation`.
    pub fn relate(
        &self,
        navigation: &str,
        records: impl IntoIterator<Item = Record>,
    ) -> RepoResult<()> {
        let nav = E::schema().navigation(navigation).ok_or_else(|| {
            RepoError::InvalidArgument(format!(
                "`{}` has no navigation `{navigation}`",
                E::schema().table
            ))
        })?;
        self.related
            .borrow_mut()
            .extend(records.into_iter().map(|record| (nav.name, record)));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Snapshot in insertion order.
    pub fn snapshot(&self) -> Vec<E> {
        self.items.borrow().clone()
    }

    fn load(&self, entity: &mut E, navigation: &str) -> RepoResult<()> {
        let nav = E::schema().navigation(navigation).ok_or_else(|| {
            RepoError::InvalidArgument(format!(
                "`{}` has no navigation `{navigation}`",
                E::schema().table
            ))
        })?;
        let parent: Value = entity.key().into();
        let mut rows: Vec<Record> = self
            .related
            .borrow()
            .iter()
            .filter(|(name, record)| {
                *name == nav.name
                    && record
                        .get(nav.foreign_key)
                        .and_then(|value| value.filter_cmp(&parent))
                        == Some(Ordering::Equal)
            })
            .map(|(_, record)| record.clone())
            .collect();
        if let Some(order_column) = nav.columns.first() {
            rows.sort_by(|left, right| {
                let a = left.get(order_column).cloned().unwrap_or(Value::Null);
                let b = right.get(order_column).cloned().unwrap_or(Value::Null);
                a.total_cmp(&b)
            });
        }
        entity.attach(nav.name, rows)
    }

    fn position(&self, key: &KeyValue) -> RepoResult<Option<usize>> {
        for (index, item) in self.items.borrow().iter().enumerate() {
            if key_of::<E>(&item.key())? == *key {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

impl<E: Entity> Reader<E> for MemorySet<E> {
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>> {
        let items = self.snapshot();
        plan.run_in_memory(items, |entity, path| self.load(entity, path))
    }
}

impl<E: Entity> EntitySet<E> for MemorySet<E> {
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>> {
        Reader::execute(self, plan)
    }

    fn find(&self, key: &E::Key) -> RepoResult<Option<E>> {
        let wanted = key_of::<E>(key)?;
        Ok(self
            .position(&wanted)?
            .and_then(|index| self.items.borrow().get(index).cloned()))
    }

    fn insert(&self, item: E) -> RepoResult<E> {
        let key = key_of::<E>(&item.key())?;
        if self.position(&key)?.is_some() {
            return Err(RepoError::InvalidArgument(format!(
                "`{}` already contains key {key}",
                E::schema().table
            )));
        }
        self.items.borrow_mut().push(item.clone());
        Ok(item)
    }

    fn delete_many(&self, spec: Spec<E>) -> RepoResult<u64> {
        let mut items = self.items.borrow_mut();
        let before = items.len();
        items.retain(|item| !spec.is_satisfied_by(item));
        Ok((before - items.len()) as u64)
    }

    fn update_many(&self, spec: Spec<E>, update: &Update) -> RepoResult<u64> {
        update.validate::<E>()?;
        let mut items = self.items.borrow_mut();
        let mut updated = Vec::with_capacity(items.len());
        let mut affected = 0_u64;
        for item in items.iter() {
            if spec.is_satisfied_by(item) {
                updated.push(update.apply_to(item)?);
                affected += 1;
            } else {
                updated.push(item.clone());
            }
        }
        *items = updated;
        Ok(affected)
    }
}
