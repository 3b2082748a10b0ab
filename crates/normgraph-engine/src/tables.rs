//! Normalized table sets: per-entity maps from encoded key to flat record.

use std::collections::hash_map::Entry;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One normalized record. Relation fields hold key references or empty
/// placeholders, never nested records.
pub type Record = Map<String, Value>;

/// One entity's table: encoded key -> record.
pub type RecordTable = AHashMap<String, Record>;

/// A set of entity tables, as produced by one normalization pass or held by
/// the surrounding store. Serializes as the plain entity-to-table map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedTables {
    tables: AHashMap<String, RecordTable>,
}

impl NormalizedTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, entity: &str) -> Option<&RecordTable> {
        self.tables.get(entity)
    }

    pub fn table_mut(&mut self, entity: &str) -> &mut RecordTable {
        self.tables.entry(entity.to_string()).or_default()
    }

    pub fn record(&self, entity: &str, key: &str) -> Option<&Record> {
        self.tables.get(entity)?.get(key)
    }

    pub fn record_mut(&mut self, entity: &str, key: &str) -> Option<&mut Record> {
        self.tables.get_mut(entity)?.get_mut(key)
    }

    pub fn contains_record(&self, entity: &str, key: &str) -> bool {
        self.record(entity, key).is_some()
    }

    pub fn insert(&mut self, entity: impl Into<String>, key: impl Into<String>, record: Record) {
        self.tables
            .entry(entity.into())
            .or_default()
            .insert(key.into(), record);
    }

    /// Insert or merge: on key collision the new record's fields win.
    pub fn merge_record(
        &mut self,
        entity: impl Into<String>,
        key: impl Into<String>,
        record: Record,
    ) {
        let table = self.tables.entry(entity.into()).or_default();
        match table.entry(key.into()) {
            Entry::Occupied(mut slot) => {
                for (field, value) in record {
                    slot.get_mut().insert(field, value);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }

    /// Merge a whole batch into this set, batch fields winning. This is the
    /// store-side persistence step.
    pub fn merge(&mut self, batch: NormalizedTables) {
        for (entity, table) in batch.tables {
            for (key, record) in table {
                self.merge_record(entity.clone(), key, record);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordTable)> {
        self.tables.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut RecordTable)> {
        self.tables.iter_mut()
    }
}
