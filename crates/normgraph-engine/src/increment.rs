//! Auto-increment assignment.
//!
//! Each (entity, field) pair owns one monotone cursor in the normalization
//! context. Keyless records whose single primary key is an increment field
//! draw their key from the cursor as the decompose pass emits them; later
//! passes see those ids like explicit input. The pass here assigns every
//! remaining value: batch records whose field is absent or null, after
//! raising the cursor past every numeric value the field already holds in
//! the persisted and batch tables (and past numeric table keys when the
//! field is the single primary key). Re-normalizing a key the store already
//! holds adopts the stored value instead of burning a fresh one.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::debug;

use normgraph_schema::{EntityDef, SchemaGraph};

use crate::context::NormalizeContext;
use crate::key::{coerce, is_synthetic, synthetic_ordinal, Key, ID_FIELD};
use crate::tables::{NormalizedTables, RecordTable};

/// Assign auto-increment values across every batch table.
pub fn assign(
    graph: &SchemaGraph,
    ctx: &mut NormalizeContext,
    persisted: &NormalizedTables,
    tables: &mut NormalizedTables,
) {
    let entity_names: Vec<String> = tables.iter().map(|(name, _)| name.clone()).collect();
    let mut assigned = 0usize;
    for name in entity_names {
        let Some(entity) = graph.entity(&name) else {
            continue;
        };
        let fields: Vec<String> = entity.increment_fields().map(str::to_string).collect();
        for field in &fields {
            assigned += assign_field(entity, field, ctx, persisted, tables);
        }
    }
    if assigned > 0 {
        debug!(values = assigned, "assigned auto-increment values");
    }
}

fn assign_field(
    entity: &EntityDef,
    field: &str,
    ctx: &mut NormalizeContext,
    persisted: &NormalizedTables,
    tables: &mut NormalizedTables,
) -> usize {
    // Records are re-keyed only when the primary key is exactly this field.
    let rekey = entity.primary_key.single_field() == Some(field);

    let pending = match tables.table(&entity.name) {
        Some(table) => assignment_order(table, field),
        None => return 0,
    };
    if pending.is_empty() {
        return 0;
    }

    let floor = table_max(persisted.table(&entity.name), field, rekey)
        .max(table_max(tables.table(&entity.name), field, rekey));

    let mut assigned = 0;
    for key in pending {
        let adopted = persisted
            .record(&entity.name, &key)
            .and_then(|record| record.get(field))
            .filter(|value| !value.is_null())
            .cloned();

        let value = match adopted {
            Some(value) => coerce(&value),
            None => {
                let cursor = ctx.cursor_mut(&entity.name, field);
                *cursor = (*cursor).max(floor) + 1;
                Value::Number((*cursor).into())
            }
        };

        let table = tables.table_mut(&entity.name);
        if rekey {
            let Some(mut record) = table.remove(&key) else {
                continue;
            };
            let new_key = Key::Scalar(value.clone());
            record.insert(field.to_string(), value);
            record.insert(ID_FIELD.to_string(), new_key.witness());
            table.insert(new_key.encode(), record);
        } else if let Some(record) = table.get_mut(&key) {
            record.insert(field.to_string(), value);
        }
        assigned += 1;
    }
    assigned
}

/// Key value for a record that reached the decompose pass keyless, when its
/// entity's single primary key is an increment field. The cursor is raised
/// past every id the persisted and batch tables already reach before it
/// advances. `None` for entities keyed any other way.
pub(crate) fn key_for_keyless(
    ctx: &mut NormalizeContext,
    persisted: &NormalizedTables,
    batch: &NormalizedTables,
    entity: &EntityDef,
) -> Option<(String, i64)> {
    let field = entity.primary_key.single_field()?;
    if !entity.increment_fields().any(|name| name == field) {
        return None;
    }
    let floor = table_max(persisted.table(&entity.name), field, true)
        .max(table_max(batch.table(&entity.name), field, true));
    let cursor = ctx.cursor_mut(&entity.name, field);
    *cursor = (*cursor).max(floor) + 1;
    Some((field.to_string(), *cursor))
}

/// Keys of records whose field still needs a value, in deterministic
/// assignment order: synthetic keys by issue order, then the rest
/// lexicographically.
fn assignment_order(table: &RecordTable, field: &str) -> Vec<String> {
    let mut keys: Vec<String> = table
        .iter()
        .filter(|(_, record)| record.get(field).map_or(true, Value::is_null))
        .map(|(key, _)| key.clone())
        .collect();
    keys.sort_by(|a, b| match (is_synthetic(a), is_synthetic(b)) {
        (true, true) => synthetic_ordinal(a).cmp(&synthetic_ordinal(b)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    });
    keys
}

/// Largest integer the field (and optionally the table keys) already
/// reaches. Zero for an absent table.
fn table_max(table: Option<&RecordTable>, field: &str, include_keys: bool) -> i64 {
    let Some(table) = table else {
        return 0;
    };
    let mut max = 0;
    for (key, record) in table.iter() {
        if include_keys {
            if let Ok(n) = key.parse::<i64>() {
                max = max.max(n);
            }
        }
        if let Some(n) = record.get(field).and_then(Value::as_i64) {
            max = max.max(n);
        }
    }
    max
}
