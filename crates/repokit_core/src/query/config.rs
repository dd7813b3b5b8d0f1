//! Per-query configuration and customization scopes.
//!
//! # Responsibility
//! - Carry load hints, diagnostic tag, default sort, tracking mode and the
//!   before/after customization functions of one query invocation.
//!
//! # Invariants
//! - Every `with_*` call returns a new value; a built config is never
//!   mutated, so one config can be shared across calls and threads.
//! - Invalid arguments (blank tag, blank or unknown property) fail at the
//!   `with_*` call that received them.

use crate::model::entity::Entity;
use crate::query::filter::Filter;
use crate::query::sort::SortSequence;
use crate::query::spec::Spec;
use crate::repo::error::{RepoError, RepoResult};
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Whether returned entities are registered with the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    #[default]
    Tracked,
    NoTracking,
}

/// What a customization function may extend: extra filters and load hints.
pub struct Scope<E> {
    filters: Vec<Spec<E>>,
    includes: BTreeSet<String>,
}

impl<E> Scope<E> {
    pub(crate) fn new() -> Self {
        Self {
            filters: Vec::new(),
            includes: BTreeSet::new(),
        }
    }

    pub fn filter(mut self, spec: impl Into<Spec<E>>) -> Self {
        self.filters.push(spec.into());
        self
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.insert(path.into());
        self
    }

    pub fn filters(&self) -> &[Spec<E>] {
        &self.filters
    }

    pub fn includes(&self) -> &BTreeSet<String> {
        &self.includes
    }

    pub(crate) fn into_parts(self) -> (Vec<Spec<E>>, BTreeSet<String>) {
        (self.filters, self.includes)
    }
}

impl<E> Debug for Scope<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("filters", &self.filters)
            .field("includes", &self.includes)
            .finish()
    }
}

/// Function that extends a query scope.
pub type Customization<E> = Arc<dyn Fn(Scope<E>) -> Scope<E> + Send + Sync>;

/// Immutable options attached to one query invocation.
pub struct QueryConfig<E> {
    properties: BTreeSet<String>,
    tag: Option<String>,
    tracking: Tracking,
    sorting: SortSequence,
    before: Option<Customization<E>>,
    after: Option<Customization<E>>,
}

impl<E> Clone for QueryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            properties: self.properties.clone(),
            tag: self.tag.clone(),
            tracking: self.tracking,
            sorting: self.sorting.clone(),
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }
}

impl<E> Default for QueryConfig<E> {
    fn default() -> Self {
        Self {
            properties: BTreeSet::new(),
            tag: None,
            tracking: Tracking::Tracked,
            sorting: SortSequence::new(),
            before: None,
            after: None,
        }
    }
}

impl<E> Debug for QueryConfig<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryConfig")
            .field("properties", &self.properties)
            .field("tag", &self.tag)
            .field("tracking", &self.tracking)
            .field("sorting", &self.sorting)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

impl<E: Entity> QueryConfig<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of navigation paths to load with each result.
    pub fn with_properties<I, S>(self, properties: I) -> RepoResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut loaded = BTreeSet::new();
        for property in properties {
            let property = property.into();
            validate_navigation::<E>(&property)?;
            loaded.insert(property);
        }
        Ok(Self {
            properties: loaded,
            ..self
        })
    }

    pub fn with_tag(self, tag: &str) -> RepoResult<Self> {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(RepoError::InvalidArgument(
                "query tag cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            tag: Some(trimmed.to_string()),
            ..self
        })
    }

    /// Sort used when the query itself names no sort directives.
    pub fn with_sorting(self, sorting: SortSequence) -> Self {
        Self { sorting, ..self }
    }

    /// Runs against the base scope before the query's own filter.
    pub fn with_before_customization(
        self,
        customize: impl Fn(Scope<E>) -> Scope<E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            before: Some(Arc::new(customize)),
            ..self
        }
    }

    /// Runs after paging and load hints; its filters narrow the page.
    pub fn with_after_customization(
        self,
        customize: impl Fn(Scope<E>) -> Scope<E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            after: Some(Arc::new(customize)),
            ..self
        }
    }

    pub fn no_tracking(self) -> Self {
        Self {
            tracking: Tracking::NoTracking,
            ..self
        }
    }

    pub fn properties(&self) -> &BTreeSet<String> {
        &self.properties
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn tracking(&self) -> Tracking {
        self.tracking
    }

    pub fn sorting(&self) -> &SortSequence {
        &self.sorting
    }

    pub(crate) fn before(&self) -> Option<&Customization<E>> {
        self.before.as_ref()
    }

    pub(crate) fn after(&self) -> Option<&Customization<E>> {
        self.after.as_ref()
    }
}

/// Filter matching the entity whose key equals `key`.
pub(crate) fn key_filter<E: Entity>(key: &E::Key) -> Filter {
    Filter::eq(E::schema().key, key.clone())
}

pub(crate) fn validate_navigation<E: Entity>(path: &str) -> RepoResult<()> {
    if path.trim().is_empty() {
        return Err(RepoError::InvalidArgument(
            "load property name cannot be empty".to_string(),
        ));
    }
    let schema = E::schema();
    if schema.navigation(path).is_none() {
        return Err(RepoError::InvalidArgument(format!(
            "`{}` has no navigation `{path}`",
            schema.table
        )));
    }
    Ok(())
}
