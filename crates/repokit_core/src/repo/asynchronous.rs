//! Async forms of the capability traits.
//!
//! Every blocking capability gets an async counterpart through a blanket
//! impl. Each async call checks its `CancellationToken` first and fails with
//! `RepoError::Cancelled` before the store is touched.
//!
//! Futures are not `Send`: a unit of work is a single-writer scope.

use crate::model::entity::{Entity, Record};
use crate::model::value::FromValue;
use crate::query::config::QueryConfig;
use crate::query::filter::Filter;
use crate::query::paging::PageRequest;
use crate::query::plan::Query;
use crate::query::spec::Spec;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::read::Reader;
use crate::repo::set::EntitySet;
use crate::repo::sql::{SqlConfig, SqlExecutor};
use crate::repo::unit_of_work::{EntityLoader, SaveOptions, UnitOfWork};
use crate::repo::write::{Update, Writer};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

fn ensure_active(cancel: &CancellationToken) -> RepoResult<()> {
    if cancel.is_cancelled() {
        return Err(RepoError::Cancelled);
    }
    Ok(())
}

#[async_trait(?Send)]
pub trait AsyncReader<E: Entity> {
    async fn get_async(
        &self,
        key: &E::Key,
        config: &QueryConfig<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>>;

    async fn fetch_async(&self, query: &Query<E>, cancel: &CancellationToken)
        -> RepoResult<Vec<E>>;

    async fn get_paged_async(
        &self,
        spec: Spec<E>,
        page: PageRequest,
        config: &QueryConfig<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<E>>;

    async fn first_async(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>>;

    async fn single_async(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>>;

    async fn count_async(&self, query: &Query<E>, cancel: &CancellationToken) -> RepoResult<u64>;

    async fn any_async(&self, query: &Query<E>, cancel: &CancellationToken) -> RepoResult<bool>;

    async fn all_async(
        &self,
        query: &Query<E>,
        spec: &Spec<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<bool>;
}

#[async_trait(?Send)]
impl<E, R> AsyncReader<E> for R
where
    E: Entity,
    R: Reader<E>,
{
    async fn get_async(
        &self,
        key: &E::Key,
        config: &QueryConfig<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>> {
        ensure_active(cancel)?;
        self.get(key, config)
    }

    async fn fetch_async(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<E>> {
        ensure_active(cancel)?;
        self.fetch(query)
    }

    async fn get_paged_async(
        &self,
        spec: Spec<E>,
        page: PageRequest,
        config: &QueryConfig<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<E>> {
        ensure_active(cancel)?;
        self.get_paged(spec, page, config)
    }

    async fn first_async(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>> {
        ensure_active(cancel)?;
        self.first(query)
    }

    async fn single_async(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>> {
        ensure_active(cancel)?;
        self.single(query)
    }

    async fn count_async(&self, query: &Query<E>, cancel: &CancellationToken) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.count(query)
    }

    async fn any_async(&self, query: &Query<E>, cancel: &CancellationToken) -> RepoResult<bool> {
        ensure_active(cancel)?;
        self.any(query)
    }

    async fn all_async(
        &self,
        query: &Query<E>,
        spec: &Spec<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<bool> {
        ensure_active(cancel)?;
        self.all(query, spec)
    }
}

#[async_trait(?Send)]
pub trait AsyncWriter<E: Entity> {
    async fn add_async(&self, item: E, cancel: &CancellationToken) -> RepoResult<()>;

    async fn remove_async(&self, item: &E, cancel: &CancellationToken) -> RepoResult<()>;

    async fn modify_async(&self, item: &E, cancel: &CancellationToken) -> RepoResult<()>;

    async fn merge_async(
        &self,
        persisted: &E,
        current: &E,
        cancel: &CancellationToken,
    ) -> RepoResult<()>;

    async fn track_item_async(&self, item: &E, cancel: &CancellationToken) -> RepoResult<()>;

    async fn delete_many_async(&self, spec: Spec<E>, cancel: &CancellationToken)
        -> RepoResult<u64>;

    async fn update_many_async(
        &self,
        spec: Spec<E>,
        update: &Update,
        cancel: &CancellationToken,
    ) -> RepoResult<u64>;
}

#[async_trait(?Send)]
impl<E, W> AsyncWriter<E> for W
where
    E: Entity,
    W: Writer<E>,
{
    async fn add_async(&self, item: E, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.add(item)
    }

    async fn remove_async(&self, item: &E, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.remove(item)
    }

    async fn modify_async(&self, item: &E, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.modify(item)
    }

    async fn merge_async(
        &self,
        persisted: &E,
        current: &E,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.merge(persisted, current)
    }

    async fn track_item_async(&self, item: &E, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.track_item(item)
    }

    async fn delete_many_async(
        &self,
        spec: Spec<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.delete_many(spec)
    }

    async fn update_many_async(
        &self,
        spec: Spec<E>,
        update: &Update,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.update_many(spec, update)
    }
}

#[async_trait(?Send)]
pub trait AsyncEntitySet<E: Entity> {
    async fn query_async(&self, query: &Query<E>, cancel: &CancellationToken)
        -> RepoResult<Vec<E>>;

    async fn find_async(&self, key: &E::Key, cancel: &CancellationToken)
        -> RepoResult<Option<E>>;

    async fn insert_async(&self, item: E, cancel: &CancellationToken) -> RepoResult<E>;

    async fn delete_many_async(&self, spec: Spec<E>, cancel: &CancellationToken)
        -> RepoResult<u64>;

    async fn update_many_async(
        &self,
        spec: Spec<E>,
        update: &Update,
        cancel: &CancellationToken,
    ) -> RepoResult<u64>;
}

#[async_trait(?Send)]
impl<E, S> AsyncEntitySet<E> for S
where
    E: Entity,
    S: EntitySet<E>,
{
    async fn query_async(
        &self,
        query: &Query<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<E>> {
        ensure_active(cancel)?;
        self.query(query)
    }

    async fn find_async(
        &self,
        key: &E::Key,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<E>> {
        ensure_active(cancel)?;
        self.find(key)
    }

    async fn insert_async(&self, item: E, cancel: &CancellationToken) -> RepoResult<E> {
        ensure_active(cancel)?;
        self.insert(item)
    }

    async fn delete_many_async(
        &self,
        spec: Spec<E>,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.delete_many(spec)
    }

    async fn update_many_async(
        &self,
        spec: Spec<E>,
        update: &Update,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.update_many(spec, update)
    }
}

#[async_trait(?Send)]
pub trait AsyncUnitOfWork {
    async fn commit_async(&self, cancel: &CancellationToken) -> RepoResult<u64>;

    async fn commit_with_async(
        &self,
        options: &SaveOptions,
        cancel: &CancellationToken,
    ) -> RepoResult<u64>;

    async fn commit_and_refresh_changes_async(&self, cancel: &CancellationToken)
        -> RepoResult<u64>;
}

#[async_trait(?Send)]
impl<U: UnitOfWork> AsyncUnitOfWork for U {
    async fn commit_async(&self, cancel: &CancellationToken) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.commit()
    }

    async fn commit_with_async(
        &self,
        options: &SaveOptions,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.commit_with(options)
    }

    async fn commit_and_refresh_changes_async(
        &self,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.commit_and_refresh_changes()
    }
}

#[async_trait(?Send)]
pub trait AsyncEntityLoader {
    async fn load_property_async<E: Entity>(
        &self,
        item: &mut E,
        navigation: &str,
        cancel: &CancellationToken,
    ) -> RepoResult<()>;

    async fn load_collection_async<E: Entity>(
        &self,
        item: &mut E,
        navigation: &str,
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> RepoResult<()>;

    async fn reload_async<E: Entity>(
        &self,
        item: &mut E,
        cancel: &CancellationToken,
    ) -> RepoResult<bool>;
}

#[async_trait(?Send)]
impl<L: EntityLoader> AsyncEntityLoader for L {
    async fn load_property_async<E: Entity>(
        &self,
        item: &mut E,
        navigation: &str,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.load_property(item, navigation)
    }

    async fn load_collection_async<E: Entity>(
        &self,
        item: &mut E,
        navigation: &str,
        filter: &Filter,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.load_collection(item, navigation, filter)
    }

    async fn reload_async<E: Entity>(
        &self,
        item: &mut E,
        cancel: &CancellationToken,
    ) -> RepoResult<bool> {
        ensure_active(cancel)?;
        self.reload(item)
    }
}

#[async_trait(?Send)]
pub trait AsyncSqlExecutor {
    async fn begin_transaction_async(&self, cancel: &CancellationToken) -> RepoResult<()>;

    async fn commit_transaction_async(&self, cancel: &CancellationToken) -> RepoResult<()>;

    async fn rollback_transaction_async(&self, cancel: &CancellationToken) -> RepoResult<()>;

    async fn execute_raw_sql_async<T, F>(
        &self,
        sql: &str,
        map: F,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<T>>
    where
        F: FnMut(&Record) -> RepoResult<T>;

    async fn execute_command_async(
        &self,
        sql: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<u64>;

    async fn execute_query_async<E: Entity>(
        &self,
        sql: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<E>>;

    async fn execute_function_async<T: FromValue>(
        &self,
        name: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<T>;

    async fn execute_procedure_async(
        &self,
        name: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<u64>;
}

#[async_trait(?Send)]
impl<S: SqlExecutor> AsyncSqlExecutor for S {
    async fn begin_transaction_async(&self, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.begin_transaction()
    }

    async fn commit_transaction_async(&self, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.commit_transaction()
    }

    async fn rollback_transaction_async(&self, cancel: &CancellationToken) -> RepoResult<()> {
        ensure_active(cancel)?;
        self.rollback_transaction()
    }

    async fn execute_raw_sql_async<T, F>(
        &self,
        sql: &str,
        map: F,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<T>>
    where
        F: FnMut(&Record) -> RepoResult<T>,
    {
        ensure_active(cancel)?;
        self.execute_raw_sql(sql, map, config)
    }

    async fn execute_command_async(
        &self,
        sql: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.execute_command(sql, config)
    }

    async fn execute_query_async<E: Entity>(
        &self,
        sql: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<E>> {
        ensure_active(cancel)?;
        self.execute_query(sql, config)
    }

    async fn execute_function_async<T: FromValue>(
        &self,
        name: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<T> {
        ensure_active(cancel)?;
        self.execute_function(name, config)
    }

    async fn execute_procedure_async(
        &self,
        name: &str,
        config: &SqlConfig,
        cancel: &CancellationToken,
    ) -> RepoResult<u64> {
        ensure_active(cancel)?;
        self.execute_procedure(name, config)
    }
}
