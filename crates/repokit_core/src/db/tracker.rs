//! Identity map of tracked entities and their pending state.
//!
//! # Invariants
//! - At most one entry per `(table, key)`.
//! - `seq` records the order in which entries last changed state; commit
//!   applies pending entries in that order.
//! - Entries hold records, not entities, so one tracker serves every entity
//!   type of a unit of work.

use crate::model::entity::{EntitySchema, Record};
use crate::model::value::KeyValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub schema: &'static EntitySchema,
    pub state: EntryState,
    pub record: Record,
    /// Last persisted state; `None` when the row was never read.
    pub original: Option<Record>,
    /// Row version last read from the store; `None` when never read.
    pub version: Option<i64>,
    pub seq: u64,
}

pub(crate) type EntryKey = (&'static str, KeyValue);

#[derive(Debug, Clone, Default)]
pub(crate) struct Tracker {
    entries: BTreeMap<EntryKey, Entry>,
    next_seq: u64,
}

impl Tracker {
    pub fn get(&self, key: &EntryKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Inserts or replaces an entry, stamping a fresh sequence number.
    pub fn put(
        &mut self,
        key: EntryKey,
        schema: &'static EntitySchema,
        state: EntryState,
        record: Record,
        original: Option<Record>,
        version: Option<i64>,
    ) {
        let seq = self.bump();
        self.entries.insert(
            key,
            Entry {
                schema,
                state,
                record,
                original,
                version,
                seq,
            },
        );
    }

    /// Registers a freshly read row unless the key is already tracked.
    pub fn observe(
        &mut self,
        key: EntryKey,
        schema: &'static EntitySchema,
        record: Record,
        version: Option<i64>,
    ) {
        if self.entries.contains_key(&key) {
            return;
        }
        self.put(
            key,
            schema,
            EntryState::Unchanged,
            record.clone(),
            Some(record),
            version,
        );
    }

    pub fn forget(&mut self, key: &EntryKey) {
        self.entries.remove(key);
    }

    pub fn has_changes(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.state != EntryState::Unchanged)
    }

    /// Keys of pending entries in change order.
    pub fn pending(&self) -> Vec<EntryKey> {
        let mut pending: Vec<(&EntryKey, &Entry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state != EntryState::Unchanged)
            .collect();
        pending.sort_by_key(|(_, entry)| entry.seq);
        pending.into_iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn entry_mut(&mut self, key: &EntryKey) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    /// Drops pending changes: entries without a persisted state vanish, the
    /// rest revert to their original record.
    pub fn discard(&mut self) {
        self.entries.retain(|_, entry| {
            entry.state != EntryState::Added && entry.original.is_some()
        });
        for entry in self.entries.values_mut() {
            if let Some(original) = &entry.original {
                entry.record = original.clone();
            }
            entry.state = EntryState::Unchanged;
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryState, Tracker};
    use crate::model::entity::{EntitySchema, Record};
    use crate::model::value::KeyValue;

    const SCHEMA: EntitySchema = EntitySchema {
        table: "items",
        key: "id",
        columns: &["id", "label"],
        version: None,
        audit: None,
        navigations: &[],
    };

    fn key(id: i64) -> (&'static str, KeyValue) {
        ("items", KeyValue::Integer(id))
    }

    #[test]
    fn pending_follows_change_order_and_observe_keeps_pending_state() {
        let mut tracker = Tracker::default();
        let row = Record::new().with("id", 2_i64).with("label", "b");
        tracker.observe(key(2), &SCHEMA, row.clone(), Some(1));
        tracker.put(key(1), &SCHEMA, EntryState::Added, Record::new(), None, None);
        tracker.put(
            key(2),
            &SCHEMA,
            EntryState::Modified,
            row.clone().with("label", "c"),
            Some(row.clone()),
            Some(1),
        );
        tracker.observe(key(2), &SCHEMA, row.clone(), Some(1));

        assert_eq!(tracker.pending(), vec![key(1), key(2)]);
        assert_eq!(
            tracker.get(&key(2)).map(|entry| entry.state),
            Some(EntryState::Modified)
        );

        tracker.discard();
        assert!(!tracker.has_changes());
        assert!(tracker.get(&key(1)).is_none());
        assert_eq!(tracker.get(&key(2)).map(|entry| &entry.record), Some(&row));
    }
}
