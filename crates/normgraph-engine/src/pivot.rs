//! Pivot synthesis for many-to-many fields.
//!
//! Each (owner key, related key) pair implied by a many-to-many field's key
//! references becomes one pivot record, keyed by the pivot entity's declared
//! primary key. A pair already present in the batch or in the persisted
//! tables is left untouched, so repeated normalization of the same linkage
//! never duplicates a pivot. The owner-side field itself is cleared to `[]`;
//! the pivot table is the durable linkage.

use serde_json::Value;
use tracing::debug;

use normgraph_schema::{EntityDef, RelationDef, SchemaGraph};

use crate::context::NormalizeContext;
use crate::key::{coerce, key_of, Key, ID_FIELD};
use crate::relation::resolve_local_key;
use crate::tables::{NormalizedTables, Record, RecordTable};

/// Synthesize pivot records for every many-to-many field of every batch
/// record.
pub fn synthesize(
    graph: &SchemaGraph,
    ctx: &mut NormalizeContext,
    persisted: &NormalizedTables,
    tables: &mut NormalizedTables,
) {
    let entity_names: Vec<String> = tables.iter().map(|(name, _)| name.clone()).collect();
    let mut created = 0usize;
    for name in entity_names {
        let Some(entity) = graph.entity(&name) else {
            continue;
        };
        let fields: Vec<(String, RelationDef)> = entity
            .relations()
            .filter(|(_, def)| matches!(def, RelationDef::ManyToMany { .. }))
            .map(|(field, def)| (field.to_string(), def.clone()))
            .collect();
        if fields.is_empty() {
            continue;
        }
        let keys: Vec<String> = tables
            .table(&name)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            for (field, def) in &fields {
                created += synthesize_for_record(graph, ctx, persisted, tables, entity, key, field, def);
            }
        }
    }
    if created > 0 {
        debug!(pivots = created, "synthesized pivot records");
    }
}

fn synthesize_for_record(
    graph: &SchemaGraph,
    ctx: &mut NormalizeContext,
    persisted: &NormalizedTables,
    tables: &mut NormalizedTables,
    owner: &EntityDef,
    owner_key: &str,
    field: &str,
    def: &RelationDef,
) -> usize {
    let RelationDef::ManyToMany {
        pivot,
        foreign_pivot_key,
        related_pivot_key,
        parent_key,
        ..
    } = def
    else {
        return 0;
    };

    let Some(record) = tables.record(&owner.name, owner_key) else {
        return 0;
    };
    let Some(refs) = record.get(field).cloned() else {
        return 0;
    };
    let local_value = record.get(resolve_local_key(owner, parent_key)).map(coerce);

    if let Some(record) = tables.record_mut(&owner.name, owner_key) {
        record.insert(field.to_string(), Value::Array(Vec::new()));
    }

    let Value::Array(markers) = refs else {
        return 0;
    };
    let Some(local_value) = local_value else {
        return 0;
    };
    let Some(pivot_def) = graph.entity(pivot) else {
        return 0;
    };

    let mut created = 0;
    for marker in &markers {
        let related_value = coerce(marker);
        let mut pivot_record = Record::new();
        pivot_record.insert(foreign_pivot_key.clone(), local_value.clone());
        pivot_record.insert(related_pivot_key.clone(), related_value.clone());

        match key_of(&pivot_record, &pivot_def.primary_key) {
            Some(key) => {
                let encoded = key.encode();
                if tables.contains_record(pivot, &encoded)
                    || persisted.contains_record(pivot, &encoded)
                {
                    continue;
                }
                pivot_record.insert(ID_FIELD.to_string(), key.witness());
                tables.insert(pivot.clone(), encoded, pivot_record);
            }
            // The pivot key does not cover the pair (auto-increment pivots);
            // dedup falls back to scanning for the pair itself.
            None => {
                let pair = (foreign_pivot_key.as_str(), &local_value, related_pivot_key.as_str(), &related_value);
                if pair_linked(tables.table(pivot), pair) || pair_linked(persisted.table(pivot), pair)
                {
                    continue;
                }
                let key = Key::Scalar(Value::String(ctx.synthetic_key()));
                pivot_record.insert(ID_FIELD.to_string(), key.witness());
                tables.insert(pivot.clone(), key.encode(), pivot_record);
            }
        }
        created += 1;
    }
    created
}

fn pair_linked(
    table: Option<&RecordTable>,
    (owner_field, owner_value, related_field, related_value): (&str, &Value, &str, &Value),
) -> bool {
    let Some(table) = table else {
        return false;
    };
    table.values().any(|record| {
        record.get(owner_field) == Some(owner_value)
            && record.get(related_field) == Some(related_value)
    })
}
