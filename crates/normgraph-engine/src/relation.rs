//! The relation family: one attach surface (normalization time) and one
//! match surface (read time), both dispatched over the closed descriptor
//! enum.
//!
//! Matching is dictionary-based: related records are grouped once by their
//! `_`-joined foreign-key text and each owner looks its group up by local-key
//! text. No variant scans the full related set per owner. The polymorphic
//! owner variant instead resolves by direct key lookup against the table
//! named by each owner's type field.

use ahash::AHashMap;
use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use normgraph_schema::{EntityDef, FieldDef, PrimaryKey, RelationDef, SchemaGraph};

use crate::key::{coerce, key_of, scalar_text, Key, ID_FIELD};
use crate::tables::{NormalizedTables, Record};

// ============================================================================
// Key plumbing
// ============================================================================

/// Local-key field for an entity: the explicit declaration when present, the
/// single primary-key field otherwise. A composite primary key resolves to
/// the `$id` witness, whose value is the ordered key tuple.
pub(crate) fn resolve_local_key<'a>(
    entity: &'a EntityDef,
    explicit: &'a Option<String>,
) -> &'a str {
    if let Some(field) = explicit {
        return field;
    }
    entity.primary_key.single_field().unwrap_or(ID_FIELD)
}

/// Dictionary-key text of one field value, shared by the dictionary build
/// and the owner-side lookup. Arrays (composite `$id` witnesses) join their
/// elements with `_` and scalars use their plain text; null is no key at all.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(parts) => Some(
            parts
                .iter()
                .map(|part| scalar_text(&coerce(part)))
                .collect::<Vec<_>>()
                .join("_"),
        ),
        other => Some(scalar_text(&coerce(other))),
    }
}

/// `_`-joined text of a record's field values, the dictionary grouping key.
/// `None` when any field is absent or null; such records land in no group.
fn join_fields<S: AsRef<str>>(record: &Record, fields: &[S]) -> Option<String> {
    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        parts.push(key_text(record.get(field.as_ref())?)?);
    }
    Some(parts.join("_"))
}

/// The owner-side counterpart of [`join_fields`]: one local-key field rendered
/// through the same text.
fn local_key_text(record: &Record, local_key: &str) -> Option<String> {
    key_text(record.get(local_key)?)
}

/// Decompose one local-key value across `arity` foreign-key fields. Strings
/// split on the `_` delimiter, arrays decompose element-wise, arity one
/// passes the coerced value through.
fn decompose_value(value: &Value, arity: usize) -> Option<Vec<Value>> {
    if arity <= 1 {
        return Some(vec![coerce(value)]);
    }
    match value {
        Value::String(joined) => {
            let parts: Vec<Value> = joined
                .split('_')
                .map(|part| coerce(&Value::String(part.to_string())))
                .collect();
            (parts.len() == arity).then_some(parts)
        }
        Value::Array(parts) if parts.len() == arity => Some(parts.iter().map(coerce).collect()),
        _ => None,
    }
}

/// Encoded-table-key text for one key reference left behind by the
/// decompose pass.
pub(crate) fn reference_key(marker: &Value) -> String {
    match marker {
        Value::String(text) => text.clone(),
        Value::Array(parts) => Value::Array(parts.clone()).to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Dictionary
// ============================================================================

/// Group related records by their `_`-joined foreign-key text, preserving
/// input order within each group. This is the sole matching mechanism for
/// the foreign-key-carrying variants.
pub fn build_dictionary<'a, I, S>(records: I, fields: &[S]) -> AHashMap<String, Vec<&'a Record>>
where
    I: IntoIterator<Item = &'a Record>,
    S: AsRef<str>,
{
    let mut dictionary: AHashMap<String, Vec<&'a Record>> = AHashMap::new();
    for record in records {
        let Some(group) = join_fields(record, fields) else {
            continue;
        };
        dictionary.entry(group).or_default().push(record);
    }
    dictionary
}

// ============================================================================
// Attach (normalization time)
// ============================================================================

/// Propagate keys over a whole batch: every record of every table, every
/// declared relation field, in declaration order.
pub fn attach_all(graph: &SchemaGraph, tables: &mut NormalizedTables) {
    let entity_names: Vec<String> = tables.iter().map(|(name, _)| name.clone()).collect();
    for name in entity_names {
        let Some(entity) = graph.entity(&name) else {
            continue;
        };
        let keys: Vec<String> = tables
            .table(&name)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            for (field, def) in entity.relations() {
                attach(entity, key, field, def, tables);
            }
        }
    }
}

/// Propagate keys for one owner record's relation field, using the key
/// references the decompose pass left in it. Every write skips fields
/// already present in input: the first-established value wins.
pub fn attach(
    owner: &EntityDef,
    owner_key: &str,
    field: &str,
    def: &RelationDef,
    tables: &mut NormalizedTables,
) {
    let Some(owner_record) = tables.record(&owner.name, owner_key) else {
        return;
    };
    let Some(refs) = owner_record.get(field).cloned() else {
        return;
    };

    match def {
        RelationDef::ToOne {
            related,
            foreign_key,
            local_key,
        } => {
            let local = resolve_local_key(owner, local_key);
            let Some(local_value) = owner_record.get(local).cloned() else {
                return;
            };
            write_owner_key_into(tables, related, &refs, foreign_key, &local_value);
        }
        RelationDef::ToMany {
            related,
            foreign_key,
            local_key,
        } => {
            let local = resolve_local_key(owner, local_key);
            let Some(local_value) = owner_record.get(local).cloned() else {
                return;
            };
            let Value::Array(markers) = refs else {
                return;
            };
            for marker in &markers {
                write_owner_key_into(tables, related, marker, foreign_key, &local_value);
            }
        }
        RelationDef::BelongsTo { foreign_key, .. } => {
            let Some(record) = tables.record_mut(&owner.name, owner_key) else {
                return;
            };
            if !record.contains_key(foreign_key) {
                record.insert(foreign_key.clone(), coerce(&refs));
            }
        }
        // Pivot synthesis owns the linkage.
        RelationDef::ManyToMany { .. } => {}
        RelationDef::PolyToOne {
            related,
            id_field,
            type_field,
            local_key,
        } => {
            let local = resolve_local_key(owner, local_key);
            let Some(local_value) = owner_record.get(local).cloned() else {
                return;
            };
            write_poly_target(tables, related, &refs, id_field, type_field, &local_value, &owner.name);
        }
        RelationDef::PolyToMany {
            related,
            id_field,
            type_field,
            local_key,
        } => {
            let local = resolve_local_key(owner, local_key);
            let Some(local_value) = owner_record.get(local).cloned() else {
                return;
            };
            let Value::Array(markers) = refs else {
                return;
            };
            for marker in &markers {
                write_poly_target(tables, related, marker, id_field, type_field, &local_value, &owner.name);
            }
        }
        RelationDef::PolyOwner { id_fields, .. } => {
            let Some(parts) = decompose_value(&refs, id_fields.len()) else {
                return;
            };
            let Some(record) = tables.record_mut(&owner.name, owner_key) else {
                return;
            };
            for (id_field, part) in id_fields.iter().zip(parts) {
                if !record.contains_key(id_field) {
                    record.insert(id_field.clone(), part);
                }
            }
        }
    }
}

fn write_owner_key_into(
    tables: &mut NormalizedTables,
    related: &str,
    marker: &Value,
    foreign_key: &[String],
    local_value: &Value,
) {
    let Some(parts) = decompose_value(local_value, foreign_key.len()) else {
        return;
    };
    let Some(record) = tables.record_mut(related, &reference_key(marker)) else {
        return;
    };
    for (field, part) in foreign_key.iter().zip(parts) {
        if !record.contains_key(field) {
            record.insert(field.clone(), part);
        }
    }
}

fn write_poly_target(
    tables: &mut NormalizedTables,
    related: &str,
    marker: &Value,
    id_field: &str,
    type_field: &str,
    local_value: &Value,
    owner_name: &str,
) {
    let Some(record) = tables.record_mut(related, &reference_key(marker)) else {
        return;
    };
    if !record.contains_key(id_field) {
        record.insert(id_field.to_string(), coerce(local_value));
    }
    if !record.contains_key(type_field) {
        record.insert(type_field.to_string(), Value::String(owner_name.to_string()));
    }
}

// ============================================================================
// Match (read time)
// ============================================================================

/// Pre-filtered candidate collections supplied by the query collaborator,
/// keyed by entity name. Each collection keeps the order the caller produced
/// it in; that order carries into match groups.
#[derive(Debug, Default)]
pub struct RelatedSource<'a> {
    collections: AHashMap<String, &'a [Record]>,
}

impl<'a> RelatedSource<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: impl Into<String>, records: &'a [Record]) -> Self {
        self.collections.insert(entity.into(), records);
        self
    }

    pub fn records(&self, entity: &str) -> &'a [Record] {
        self.collections.get(entity).copied().unwrap_or(&[])
    }
}

/// Resolve one relation field onto materialized owner records.
///
/// The caller filters candidates however it likes; this pass only groups and
/// assigns. Missing keys and empty groups yield the relation's empty value
/// (`null` or `[]`), never an error. Asking for a field that is not a
/// relation is a caller bug and errors.
pub fn load(
    graph: &SchemaGraph,
    owner_entity: &str,
    field: &str,
    owners: &mut [Record],
    source: &RelatedSource<'_>,
) -> Result<()> {
    let entity = graph
        .entity(owner_entity)
        .ok_or_else(|| anyhow!("unknown entity `{owner_entity}`"))?;
    let def = match entity.field_def(field) {
        Some(FieldDef::Relation(def)) => def,
        Some(_) => bail!("field `{field}` of `{owner_entity}` is not a relation"),
        None => bail!("entity `{owner_entity}` has no field `{field}`"),
    };

    match def {
        RelationDef::ToOne {
            related,
            foreign_key,
            local_key,
        } => {
            let dictionary = build_dictionary(source.records(related), foreign_key);
            let local = resolve_local_key(entity, local_key);
            for owner in owners.iter_mut() {
                let matched = local_key_text(owner, local)
                    .and_then(|key| dictionary.get(&key))
                    .and_then(|group| group.first())
                    .map(|record| Value::Object((*record).clone()));
                owner.insert(field.to_string(), matched.unwrap_or(Value::Null));
            }
        }
        RelationDef::ToMany {
            related,
            foreign_key,
            local_key,
        } => {
            let dictionary = build_dictionary(source.records(related), foreign_key);
            let local = resolve_local_key(entity, local_key);
            for owner in owners.iter_mut() {
                let group: Vec<Value> = local_key_text(owner, local)
                    .and_then(|key| dictionary.get(&key))
                    .map(|records| {
                        records
                            .iter()
                            .map(|record| Value::Object((*record).clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                owner.insert(field.to_string(), Value::Array(group));
            }
        }
        RelationDef::BelongsTo {
            parent,
            foreign_key,
            owner_key,
        } => {
            let parent_def = graph
                .entity(parent)
                .ok_or_else(|| anyhow!("unknown entity `{parent}`"))?;
            let key_field = resolve_local_key(parent_def, owner_key);
            let dictionary = build_dictionary(source.records(parent), &[key_field]);
            for owner in owners.iter_mut() {
                let matched = local_key_text(owner, foreign_key)
                    .and_then(|key| dictionary.get(&key))
                    .and_then(|group| group.first())
                    .map(|record| Value::Object((*record).clone()));
                owner.insert(field.to_string(), matched.unwrap_or(Value::Null));
            }
        }
        RelationDef::ManyToMany {
            related,
            pivot,
            foreign_pivot_key,
            related_pivot_key,
            parent_key,
            related_key,
        } => {
            let related_def = graph
                .entity(related)
                .ok_or_else(|| anyhow!("unknown entity `{related}`"))?;
            let owner_side = resolve_local_key(entity, parent_key);
            let related_side = resolve_local_key(related_def, related_key);
            let pivot_dictionary =
                build_dictionary(source.records(pivot), &[foreign_pivot_key.as_str()]);
            let related_dictionary =
                build_dictionary(source.records(related), &[related_side]);
            for owner in owners.iter_mut() {
                let group: Vec<Value> = local_key_text(owner, owner_side)
                    .and_then(|key| pivot_dictionary.get(&key))
                    .map(|pivots| {
                        pivots
                            .iter()
                            .filter_map(|pivot_record| {
                                let related_text =
                                    local_key_text(pivot_record, related_pivot_key)?;
                                let group = related_dictionary.get(&related_text)?;
                                group
                                    .first()
                                    .map(|record| Value::Object((*record).clone()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                owner.insert(field.to_string(), Value::Array(group));
            }
        }
        RelationDef::PolyToOne {
            related,
            id_field,
            type_field,
            local_key,
        } => {
            let candidates = partition_by_type(source.records(related), type_field, owner_entity);
            let dictionary = build_dictionary(candidates, &[id_field.as_str()]);
            let local = resolve_local_key(entity, local_key);
            for owner in owners.iter_mut() {
                let matched = local_key_text(owner, local)
                    .and_then(|key| dictionary.get(&key))
                    .and_then(|group| group.first())
                    .map(|record| Value::Object((*record).clone()));
                owner.insert(field.to_string(), matched.unwrap_or(Value::Null));
            }
        }
        RelationDef::PolyToMany {
            related,
            id_field,
            type_field,
            local_key,
        } => {
            let candidates = partition_by_type(source.records(related), type_field, owner_entity);
            let dictionary = build_dictionary(candidates, &[id_field.as_str()]);
            let local = resolve_local_key(entity, local_key);
            for owner in owners.iter_mut() {
                let group: Vec<Value> = local_key_text(owner, local)
                    .and_then(|key| dictionary.get(&key))
                    .map(|records| {
                        records
                            .iter()
                            .map(|record| Value::Object((*record).clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                owner.insert(field.to_string(), Value::Array(group));
            }
        }
        RelationDef::PolyOwner {
            id_fields,
            type_field,
        } => {
            // Owners partition by their type value; each type's candidates
            // are keyed once by primary key and hit directly. Types never
            // cross-assign.
            let mut keyed: AHashMap<String, Option<AHashMap<String, &Record>>> = AHashMap::new();
            for owner in owners.iter_mut() {
                let type_name = owner
                    .get(type_field)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let matched = type_name.and_then(|name| {
                    let slot = keyed.entry(name.clone()).or_insert_with(|| {
                        graph.entity(&name).map(|target| {
                            key_by_primary_key(source.records(&name), &target.primary_key)
                        })
                    });
                    let table = slot.as_ref()?;
                    let key = owner_reference_text(owner, id_fields)?;
                    table
                        .get(&key)
                        .map(|record| Value::Object((*record).clone()))
                });
                owner.insert(field.to_string(), matched.unwrap_or(Value::Null));
            }
        }
    }

    Ok(())
}

fn partition_by_type<'a>(
    records: &'a [Record],
    type_field: &str,
    owner_entity: &str,
) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| record.get(type_field).and_then(Value::as_str) == Some(owner_entity))
        .collect()
}

fn key_by_primary_key<'a>(
    records: &'a [Record],
    primary_key: &PrimaryKey,
) -> AHashMap<String, &'a Record> {
    let mut keyed = AHashMap::with_capacity(records.len());
    for record in records {
        let Some(key) = key_of(record, primary_key) else {
            continue;
        };
        keyed.entry(key.encode()).or_insert(record);
    }
    keyed
}

/// Encoded-key text built from an owner's id fields, for the direct lookup
/// the polymorphic owner variant performs.
fn owner_reference_text(owner: &Record, id_fields: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(id_fields.len());
    for field in id_fields {
        match owner.get(field)? {
            value @ (Value::String(_) | Value::Number(_)) => parts.push(coerce(value)),
            _ => return None,
        }
    }
    let key = if parts.len() == 1 {
        Key::Scalar(parts.pop()?)
    } else {
        Key::Composite(parts)
    };
    Some(key.encode())
}
