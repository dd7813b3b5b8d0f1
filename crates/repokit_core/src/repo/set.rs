//! Set contract: a queryable collection with immediate writes.

use crate::model::entity::Entity;
use crate::query::plan::{Query, QueryPlan};
use crate::query::spec::Spec;
use crate::repo::error::RepoResult;
use crate::repo::write::Update;

/// Untracked collection of `E` that writes straight to its store.
pub trait EntitySet<E: Entity> {
    /// Runs a compiled plan; tracking flags are ignored.
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>>;

    fn find(&self, key: &E::Key) -> RepoResult<Option<E>>;

    /// Persists `item` immediately and returns the stored entity.
    fn insert(&self, item: E) -> RepoResult<E>;

    fn delete_many(&self, spec: Spec<E>) -> RepoResult<u64>;

    fn update_many(&self, spec: Spec<E>, update: &Update) -> RepoResult<u64>;

    fn query(&self, query: &Query<E>) -> RepoResult<Vec<E>> {
        self.execute(&query.compile()?)
    }
}
