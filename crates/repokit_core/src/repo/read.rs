//! Read-only repository contract.
//!
//! # Responsibility
//! - Expose every read shape (get, list, page, first, single, count, any,
//!   all, projections) over one `Query`-driven surface.
//!
//! # Invariants
//! - Every default method compiles its query, so argument errors surface
//!   before the store is touched.
//! - Backends only implement `execute`; the other methods may be overridden
//!   for efficiency but must return the same results.

use crate::model::entity::Entity;
use crate::query::config::{key_filter, QueryConfig};
use crate::query::paging::PageRequest;
use crate::query::plan::{Query, QueryPlan};
use crate::query::spec::{Spec, Specification};
use crate::repo::error::{RepoError, RepoResult};

/// Read capability over entities of type `E`.
pub trait Reader<E: Entity> {
    /// Runs a compiled plan through every pipeline stage.
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>>;

    /// Entity with `key`, or `None`.
    fn get(&self, key: &E::Key, config: &QueryConfig<E>) -> RepoResult<Option<E>> {
        let query = Query::matching(key_filter::<E>(key)).with_config(config.clone());
        self.first(&query)
    }

    fn fetch(&self, query: &Query<E>) -> RepoResult<Vec<E>> {
        self.execute(&query.compile()?)
    }

    /// One zero-based page of the entities matching `spec`.
    fn get_paged(
        &self,
        spec: Spec<E>,
        page: PageRequest,
        config: &QueryConfig<E>,
    ) -> RepoResult<Vec<E>> {
        let query = Query::matching(spec)
            .paged(page)
            .with_config(config.clone());
        self.fetch(&query)
    }

    fn first(&self, query: &Query<E>) -> RepoResult<Option<E>> {
        let plan = query.compile()?.limited(1);
        Ok(self.execute(&plan)?.into_iter().next())
    }

    /// Like `first`, but more than one match is an error.
    fn single(&self, query: &Query<E>) -> RepoResult<Option<E>> {
        let plan = query.compile()?.limited(2);
        let mut rows = self.execute(&plan)?;
        if rows.len() > 1 {
            return Err(RepoError::MultipleResults {
                table: E::schema().table,
            });
        }
        Ok(rows.pop())
    }

    fn count(&self, query: &Query<E>) -> RepoResult<u64> {
        Ok(self.fetch(query)?.len() as u64)
    }

    fn any(&self, query: &Query<E>) -> RepoResult<bool> {
        Ok(self.first(query)?.is_some())
    }

    /// Whether every entity selected by `query` satisfies `spec`.
    /// Vacuously true when nothing is selected.
    fn all(&self, query: &Query<E>, spec: &Spec<E>) -> RepoResult<bool> {
        Ok(self
            .fetch(query)?
            .iter()
            .all(|entity| spec.is_satisfied_by(entity)))
    }

    fn fetch_mapped<T, F>(&self, query: &Query<E>, map: F) -> RepoResult<Vec<T>>
    where
        Self: Sized,
        F: FnMut(E) -> T,
    {
        Ok(self.fetch(query)?.into_iter().map(map).collect())
    }

    fn first_mapped<T, F>(&self, query: &Query<E>, map: F) -> RepoResult<Option<T>>
    where
        Self: Sized,
        F: FnOnce(E) -> T,
    {
        Ok(self.first(query)?.map(map))
    }
}
