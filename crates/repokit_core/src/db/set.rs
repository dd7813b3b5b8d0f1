//! Untracked SQLite set.

use crate::config::StoreConfig;
use crate::db::store;
use crate::model::entity::Entity;
use crate::model::value::Value;
use crate::query::plan::{Query, QueryPlan};
use crate::query::spec::Spec;
use crate::repo::error::RepoResult;
use crate::repo::read::Reader;
use crate::repo::set::EntitySet;
use crate::repo::write::Update;
use log::debug;
use rusqlite::Connection;
use std::marker::PhantomData;

/// `EntitySet` whose writes hit the store immediately.
pub struct SqliteSet<'c, E> {
    conn: &'c Connection,
    max_page_size: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<'c, E: Entity> SqliteSet<'c, E> {
    pub fn new(conn: &'c Connection, config: &StoreConfig) -> Self {
        Self {
            conn,
            max_page_size: config.max_page_size,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Reader<E> for SqliteSet<'_, E> {
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>> {
        Ok(store::load_plan(self.conn, plan, self.max_page_size)?
            .into_iter()
            .map(|row| row.entity)
            .collect())
    }

    fn count(&self, query: &Query<E>) -> RepoResult<u64> {
        store::count_plan(self.conn, &query.compile()?, self.max_page_size)
    }

    fn any(&self, query: &Query<E>) -> RepoResult<bool> {
        store::exists_plan(self.conn, &query.compile()?, self.max_page_size)
    }

    fn all(&self, query: &Query<E>, spec: &Spec<E>) -> RepoResult<bool> {
        store::all_plan(self.conn, &query.compile()?, spec, self.max_page_size)
    }
}

impl<E: Entity> EntitySet<E> for SqliteSet<'_, E> {
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>> {
        Reader::execute(self, plan)
    }

    fn find(&self, key: &E::Key) -> RepoResult<Option<E>> {
        let key: Value = key.clone().into();
        match store::reload(self.conn, E::schema(), &key)? {
            Some((record, _)) => Ok(Some(E::from_record(&record)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, item: E) -> RepoResult<E> {
        let schema = E::schema();
        let record = item.to_record();
        store::atomically(self.conn, || store::insert_row(self.conn, schema, &record))?;
        debug!(
            "event=set_insert module=db status=ok table={}",
            schema.table
        );
        Ok(item)
    }

    fn delete_many(&self, spec: Spec<E>) -> RepoResult<u64> {
        store::delete_many(self.conn, &spec)
    }

    fn update_many(&self, spec: Spec<E>, update: &Update) -> RepoResult<u64> {
        store::update_many(self.conn, &spec, update)
    }
}
