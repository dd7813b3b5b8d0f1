//! SQLite unit of work and the tracked repositories it hands out.
//!
//! # Responsibility
//! - Track entities read or changed through its repositories.
//! - Apply pending changes in one savepoint with optimistic concurrency.
//! - Load navigations and reload single entities on request.
//!
//! # Invariants
//! - Pending changes apply in the order they were declared.
//! - A failed commit leaves the store and the tracker untouched.
//! - Updates and deletes of rows read through the unit of work only match
//!   the version that was read; a mismatch is a `ConcurrencyConflict`.
//! - Bulk operations bypass the tracker.
//!
//! # See also
//! - crate::db::tracker

use crate::config::StoreConfig;
use crate::db::set::SqliteSet;
use crate::db::sql_executor::SqliteSqlExecutor;
use crate::db::store::{self, Loaded};
use crate::db::tracker::{EntryKey, EntryState, Tracker};
use crate::model::entity::{key_of, Entity, EntitySchema, Record};
use crate::model::value::Value;
use crate::query::filter::Filter;
use crate::query::config::Tracking;
use crate::query::plan::{Query, QueryPlan};
use crate::query::spec::Spec;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::read::Reader;
use crate::repo::unit_of_work::{EntityLoader, SaveOptions, UnitOfWork};
use crate::repo::write::{Update, Writer};
use log::{info, warn};
use rusqlite::Connection;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Single-writer change scope over one SQLite connection.
pub struct SqliteUnitOfWork<'c> {
    conn: &'c Connection,
    config: StoreConfig,
    tracker: RefCell<Tracker>,
}

enum Outcome {
    Written {
        record: Record,
        version: Option<i64>,
    },
    Removed,
}

impl<'c> SqliteUnitOfWork<'c> {
    pub fn new(conn: &'c Connection, config: &StoreConfig) -> Self {
        Self {
            conn,
            config: config.clone(),
            tracker: RefCell::new(Tracker::default()),
        }
    }

    /// Tracked repository over `E` bound to this unit of work.
    pub fn repository<E: Entity>(&self) -> SqliteRepository<'_, 'c, E> {
        SqliteRepository {
            uow: self,
            _entity: PhantomData,
        }
    }

    /// Untracked set over `E` on the same connection.
    pub fn set<E: Entity>(&self) -> SqliteSet<'c, E> {
        SqliteSet::new(self.conn, &self.config)
    }

    pub fn sql_executor(&self) -> SqliteSqlExecutor<'c> {
        SqliteSqlExecutor::new(self.conn, &self.config)
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.borrow().has_changes()
    }

    /// Current tracked state of `key`; `None` when untracked or deleted.
    pub fn tracked<E: Entity>(&self, key: &E::Key) -> RepoResult<Option<E>> {
        let entry_key = entry_key::<E>(key)?;
        match self.tracker.borrow().get(&entry_key) {
            Some(entry) if entry.state != EntryState::Deleted => {
                Ok(Some(E::from_record(&entry.record)?))
            }
            _ => Ok(None),
        }
    }

    pub fn entry_state<E: Entity>(&self, key: &E::Key) -> RepoResult<Option<EntryState>> {
        let entry_key = entry_key::<E>(key)?;
        Ok(self.tracker.borrow().get(&entry_key).map(|entry| entry.state))
    }

    fn save(&self, options: &SaveOptions) -> RepoResult<u64> {
        let pending = self.tracker.borrow().pending();
        if pending.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        let outcomes = store::atomically(self.conn, || {
            let tracker = self.tracker.borrow();
            let mut outcomes = Vec::with_capacity(pending.len());
            for key in &pending {
                let Some(entry) = tracker.get(key) else {
                    continue;
                };
                let schema = entry.schema;
                let key_value: Value = key.1.clone().into();
                match entry.state {
                    EntryState::Added => {
                        let record = stamp(schema, entry.record.clone(), options, true);
                        let version = store::insert_row(self.conn, schema, &record)?;
                        outcomes.push((key.clone(), Outcome::Written { record, version }));
                    }
                    EntryState::Modified => {
                        let record = stamp(schema, entry.record.clone(), options, false);
                        let changed = store::update_row(
                            self.conn,
                            schema,
                            &record,
                            key_value.clone(),
                            entry.version,
                        )?;
                        if changed == 0 {
                            return Err(conflict(key));
                        }
                        let version =
                            store::read_version(self.conn, schema, &key_value)?.flatten();
                        outcomes.push((key.clone(), Outcome::Written { record, version }));
                    }
                    EntryState::Deleted => {
                        let changed =
                            store::delete_row(self.conn, schema, key_value, entry.version)?;
                        if changed == 0 {
                            return Err(conflict(key));
                        }
                        outcomes.push((key.clone(), Outcome::Removed));
                    }
                    EntryState::Unchanged => {}
                }
            }
            Ok(outcomes)
        });

        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(
                    "event=commit module=db status=error pending={} duration_ms={} error={}",
                    pending.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        let written = outcomes.len() as u64;
        let mut tracker = self.tracker.borrow_mut();
        for (key, outcome) in outcomes {
            match outcome {
                Outcome::Written { record, version } => {
                    if let Some(entry) = tracker.entry_mut(&key) {
                        entry.state = EntryState::Unchanged;
                        entry.original = Some(record.clone());
                        entry.record = record;
                        entry.version = version;
                    }
                }
                Outcome::Removed => tracker.forget(&key),
            }
        }

        info!(
            "event=commit module=db status=ok rows={} audit={} duration_ms={}",
            written,
            options.is_audit_metadata(),
            started_at.elapsed().as_millis()
        );
        Ok(written)
    }

    /// Client wins: adopt the stored version of every pending row. Rows
    /// deleted by someone else are re-inserted when modified here and
    /// dropped when deleted here.
    fn refresh_versions(&self) -> RepoResult<()> {
        let mut tracker = self.tracker.borrow_mut();
        for key in tracker.pending() {
            let Some((schema, state)) = tracker.get(&key).map(|entry| (entry.schema, entry.state))
            else {
                continue;
            };
            if state == EntryState::Added {
                continue;
            }
            let key_value: Value = key.1.clone().into();
            let stored = store::read_version(self.conn, schema, &key_value)?;
            match stored {
                Some(version) => {
                    if let Some(entry) = tracker.entry_mut(&key) {
                        entry.version = version;
                    }
                }
                None if state == EntryState::Deleted => tracker.forget(&key),
                None => {
                    if let Some(entry) = tracker.entry_mut(&key) {
                        entry.state = EntryState::Added;
                        entry.version = None;
                    }
                }
            }
        }
        Ok(())
    }

    /// Replaces every tracked entry with the stored row.
    fn reload_tracked(&self) -> RepoResult<()> {
        let mut tracker = self.tracker.borrow_mut();
        for key in tracker.keys() {
            let Some(schema) = tracker.get(&key).map(|entry| entry.schema) else {
                continue;
            };
            let key_value: Value = key.1.clone().into();
            match store::reload(self.conn, schema, &key_value)? {
                Some((record, version)) => {
                    if let Some(entry) = tracker.entry_mut(&key) {
                        entry.state = EntryState::Unchanged;
                        entry.original = Some(record.clone());
                        entry.record = record;
                        entry.version = version;
                    }
                }
                None => tracker.forget(&key),
            }
        }
        Ok(())
    }
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn commit_with(&self, options: &SaveOptions) -> RepoResult<u64> {
        self.save(options)
    }

    fn commit_and_refresh_changes(&self) -> RepoResult<u64> {
        let options = SaveOptions::default();
        let written = match self.save(&options) {
            Ok(written) => written,
            Err(RepoError::ConcurrencyConflict { table, key }) => {
                info!(
                    "event=commit_refresh module=db status=retry table={} key={}",
                    table, key
                );
                let snapshot = self.tracker.borrow().clone();
                match self.refresh_versions().and_then(|()| self.save(&options)) {
                    Ok(written) => written,
                    Err(err) => {
                        *self.tracker.borrow_mut() = snapshot;
                        return Err(err);
                    }
                }
            }
            Err(err) => return Err(err),
        };
        self.reload_tracked()?;
        Ok(written)
    }

    fn rollback_changes(&self) {
        self.tracker.borrow_mut().discard();
    }
}

impl EntityLoader for SqliteUnitOfWork<'_> {
    fn load_property<E: Entity>(&self, item: &mut E, navigation: &str) -> RepoResult<()> {
        store::load_navigation(self.conn, item, navigation, None)?;
        Ok(())
    }

    fn load_collection<E: Entity>(
        &self,
        item: &mut E,
        navigation: &str,
        filter: &Filter,
    ) -> RepoResult<()> {
        store::load_navigation(self.conn, item, navigation, Some(filter))?;
        Ok(())
    }

    fn reload<E: Entity>(&self, item: &mut E) -> RepoResult<bool> {
        let key = entry_key::<E>(&item.key())?;
        let key_value: Value = item.key().into();
        let mut tracker = self.tracker.borrow_mut();
        let Some((record, version)) = store::reload(self.conn, E::schema(), &key_value)? else {
            tracker.forget(&key);
            return Ok(false);
        };
        *item = E::from_record(&record)?;
        match tracker.entry_mut(&key) {
            Some(entry) => {
                entry.state = EntryState::Unchanged;
                entry.original = Some(record.clone());
                entry.record = record;
                entry.version = version;
            }
            None => tracker.observe(key, E::schema(), record, version),
        }
        Ok(true)
    }
}

fn entry_key<E: Entity>(key: &E::Key) -> RepoResult<EntryKey> {
    Ok((E::schema().table, key_of::<E>(key)?))
}

fn conflict(key: &EntryKey) -> RepoError {
    RepoError::ConcurrencyConflict {
        table: key.0,
        key: key.1.clone(),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

/// Writes audit columns into `record` when the commit asks for them.
fn stamp(schema: &EntitySchema, mut record: Record, options: &SaveOptions, insert: bool) -> Record {
    let (Some(audit), Some(user)) = (schema.audit, options.user_id()) else {
        return record;
    };
    let now = Value::Integer(now_millis());
    if insert {
        record.insert(audit.created_by, user.clone());
        record.insert(audit.created_at, now.clone());
    }
    record.insert(audit.updated_by, user.clone());
    record.insert(audit.updated_at, now);
    record
}

/// Repository over `E` whose reads and writes go through a unit of work.
pub struct SqliteRepository<'u, 'c, E> {
    uow: &'u SqliteUnitOfWork<'c>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqliteRepository<'_, '_, E> {
    fn observe(&self, plan: &QueryPlan<E>, loaded: Vec<Loaded<E>>) -> RepoResult<Vec<E>> {
        if plan.tracking() == Tracking::NoTracking {
            return Ok(loaded.into_iter().map(|row| row.entity).collect());
        }
        let mut tracker = self.uow.tracker.borrow_mut();
        let mut entities = Vec::with_capacity(loaded.len());
        for row in loaded {
            let key = entry_key::<E>(&row.entity.key())?;
            tracker.observe(key, E::schema(), row.record, row.version);
            entities.push(row.entity);
        }
        Ok(entities)
    }
}

impl<E: Entity> Reader<E> for SqliteRepository<'_, '_, E> {
    fn execute(&self, plan: &QueryPlan<E>) -> RepoResult<Vec<E>> {
        let loaded = store::load_plan(self.uow.conn, plan, self.uow.config.max_page_size)?;
        self.observe(plan, loaded)
    }

    fn count(&self, query: &Query<E>) -> RepoResult<u64> {
        store::count_plan(
            self.uow.conn,
            &query.compile()?,
            self.uow.config.max_page_size,
        )
    }

    fn any(&self, query: &Query<E>) -> RepoResult<bool> {
        store::exists_plan(
            self.uow.conn,
            &query.compile()?,
            self.uow.config.max_page_size,
        )
    }

    fn all(&self, query: &Query<E>, spec: &Spec<E>) -> RepoResult<bool> {
        store::all_plan(
            self.uow.conn,
            &query.compile()?,
            spec,
            self.uow.config.max_page_size,
        )
    }
}

impl<E: Entity> Writer<E> for SqliteRepository<'_, '_, E> {
    fn add(&self, item: E) -> RepoResult<()> {
        let key = entry_key::<E>(&item.key())?;
        let record = item.to_record();
        let mut tracker = self.uow.tracker.borrow_mut();
        match tracker.get(&key).cloned() {
            Some(entry) if entry.state == EntryState::Deleted => {
                tracker.put(
                    key,
                    E::schema(),
                    EntryState::Modified,
                    record,
                    entry.original,
                    entry.version,
                );
            }
            Some(_) => {
                return Err(RepoError::InvalidArgument(format!(
                    "`{}` key {} is already tracked",
                    key.0, key.1
                )));
            }
            None => tracker.put(key, E::schema(), EntryState::Added, record, None, None),
        }
        Ok(())
    }

    fn remove(&self, item: &E) -> RepoResult<()> {
        let key = entry_key::<E>(&item.key())?;
        let mut tracker = self.uow.tracker.borrow_mut();
        match tracker.get(&key).cloned() {
            Some(entry) if entry.state == EntryState::Added => tracker.forget(&key),
            Some(entry) => tracker.put(
                key,
                E::schema(),
                EntryState::Deleted,
                entry.record,
                entry.original,
                entry.version,
            ),
            None => tracker.put(
                key,
                E::schema(),
                EntryState::Deleted,
                item.to_record(),
                None,
                None,
            ),
        }
        Ok(())
    }

    fn modify(&self, item: &E) -> RepoResult<()> {
        let key = entry_key::<E>(&item.key())?;
        let record = item.to_record();
        let mut tracker = self.uow.tracker.borrow_mut();
        match tracker.get(&key).cloned() {
            Some(entry) if entry.state == EntryState::Deleted => {
                return Err(RepoError::InvalidArgument(format!(
                    "`{}` key {} is marked for deletion",
                    key.0, key.1
                )));
            }
            Some(entry) if entry.state == EntryState::Added => {
                tracker.put(key, E::schema(), EntryState::Added, record, None, None);
            }
            Some(entry) => tracker.put(
                key,
                E::schema(),
                EntryState::Modified,
                record,
                entry.original,
                entry.version,
            ),
            None => tracker.put(key, E::schema(), EntryState::Modified, record, None, None),
        }
        Ok(())
    }

    fn track_item(&self, item: &E) -> RepoResult<()> {
        let key = entry_key::<E>(&item.key())?;
        let record = item.to_record();
        self.uow
            .tracker
            .borrow_mut()
            .observe(key, E::schema(), record, None);
        Ok(())
    }

    fn delete_many(&self, spec: Spec<E>) -> RepoResult<u64> {
        store::delete_many(self.uow.conn, &spec)
    }

    fn update_many(&self, spec: Spec<E>, update: &Update) -> RepoResult<u64> {
        store::update_many(self.uow.conn, &spec, update)
    }
}
