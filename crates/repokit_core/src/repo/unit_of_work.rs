//! Unit-of-work contract and commit options.
//!
//! # Invariants
//! - A commit applies every pending change or none of them.
//! - A unit of work is a single-writer scope; it is neither `Send` nor
//!   internally locked.

use crate::model::entity::Entity;
use crate::model::value::Value;
use crate::query::filter::Filter;
use crate::repo::error::RepoResult;

/// Immutable options for one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    audit_user: Option<Value>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps audit columns of written rows with `user_id` and the commit
    /// time.
    pub fn with_audit_metadata(&self, user_id: impl Into<Value>) -> Self {
        Self {
            audit_user: Some(user_id.into()),
        }
    }

    pub fn is_audit_metadata(&self) -> bool {
        self.audit_user.is_some()
    }

    pub fn user_id(&self) -> Option<&Value> {
        self.audit_user.as_ref()
    }
}

/// Commit and rollback of tracked changes.
pub trait UnitOfWork {
    /// Applies pending changes; returns the number of rows written.
    fn commit(&self) -> RepoResult<u64> {
        self.commit_with(&SaveOptions::default())
    }

    fn commit_with(&self, options: &SaveOptions) -> RepoResult<u64>;

    /// Commits with client-wins conflict resolution: stale version tokens are
    /// refreshed from the store and the commit is retried once. Tracked
    /// entries are reloaded afterwards.
    fn commit_and_refresh_changes(&self) -> RepoResult<u64>;

    /// Discards every pending change.
    fn rollback_changes(&self);
}

/// Explicit loading for entities already in hand.
pub trait EntityLoader {
    /// Loads every related row of `navigation` onto `item`.
    fn load_property<E: Entity>(&self, item: &mut E, navigation: &str) -> RepoResult<()>;

    /// Loads the related rows of `navigation` that match `filter`; the
    /// filter names columns of the related table.
    fn load_collection<E: Entity>(
        &self,
        item: &mut E,
        navigation: &str,
        filter: &Filter,
    ) -> RepoResult<()>;

    /// Overwrites `item` with its stored row and drops pending changes to
    /// it. Returns `false`, and stops tracking the item, when the row no
    /// longer exists. Navigations are not reloaded.
    fn reload<E: Entity>(&self, item: &mut E) -> RepoResult<bool>;
}
