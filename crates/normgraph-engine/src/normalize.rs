//! The normalization pipeline: nested input in, flat per-entity tables out.
//!
//! Five passes run in a fixed order: decompose → pivot synthesis → attach →
//! default fill → increment assignment. Decompose walks the input and emits
//! every nested record into its own entity's table, leaving key references
//! behind in relation fields; the later passes only ever see flat records.
//! Pivot synthesis and attach touch disjoint fields, fill and increment run
//! over whole tables.

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};
use tracing::debug;

use normgraph_schema::{EntityDef, RelationDef, SchemaGraph};

use crate::context::NormalizeContext;
use crate::key::{coerce, key_of, Key, ID_FIELD};
use crate::tables::{NormalizedTables, Record};
use crate::{fill, increment, pivot, relation};

/// Pipeline entry point. Borrows the schema graph; every piece of mutable
/// state lives in the caller's context and table sets.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'g> {
    graph: &'g SchemaGraph,
}

impl<'g> Normalizer<'g> {
    pub fn new(graph: &'g SchemaGraph) -> Self {
        Normalizer { graph }
    }

    pub fn graph(&self) -> &'g SchemaGraph {
        self.graph
    }

    /// Normalize one input batch rooted at `entity`.
    ///
    /// `persisted` is the store's current table set; it seeds pivot
    /// deduplication and increment adoption and is never modified. Callers
    /// without a store pass an empty set. Empty input (`null`, `[]`, `{}`)
    /// yields an empty table set, not an error.
    pub fn normalize(
        &self,
        ctx: &mut NormalizeContext,
        persisted: &NormalizedTables,
        entity: &str,
        input: &Value,
    ) -> Result<NormalizedTables> {
        let mut tables = self.decompose(ctx, persisted, entity, input)?;
        if tables.is_empty() {
            return Ok(tables);
        }
        pivot::synthesize(self.graph, ctx, persisted, &mut tables);
        relation::attach_all(self.graph, &mut tables);
        fill::fill_defaults(self.graph, &mut tables);
        increment::assign(self.graph, ctx, persisted, &mut tables);
        debug!(root = entity, entities = tables.len(), "normalized batch");
        Ok(tables)
    }

    /// Decompose pass alone: flatten nested input into per-entity tables
    /// without touching foreign keys, defaults, or pivots. `persisted` seeds
    /// the keys issued to keyless records of increment-keyed entities.
    pub fn decompose(
        &self,
        ctx: &mut NormalizeContext,
        persisted: &NormalizedTables,
        entity: &str,
        input: &Value,
    ) -> Result<NormalizedTables> {
        let mut tables = NormalizedTables::new();
        if is_empty_input(input) {
            return Ok(tables);
        }
        let root = self
            .graph
            .entity(entity)
            .ok_or_else(|| anyhow!("unknown entity `{entity}`"))?;
        match input {
            Value::Object(map) => {
                self.decompose_record(ctx, persisted, root, map, &mut tables)?;
            }
            Value::Array(items) => {
                for item in items {
                    let Value::Object(map) = item else {
                        bail!("input for `{entity}` must be a record or a list of records");
                    };
                    self.decompose_record(ctx, persisted, root, map, &mut tables)?;
                }
            }
            _ => bail!("input for `{entity}` must be a record or a list of records"),
        }
        Ok(tables)
    }

    /// Emit one record into its table and return the key reference the
    /// parent stores in its relation field. A keyless record takes the next
    /// increment id when its single primary key is an increment field, and a
    /// synthetic key otherwise.
    fn decompose_record(
        &self,
        ctx: &mut NormalizeContext,
        persisted: &NormalizedTables,
        entity: &EntityDef,
        input: &Map<String, Value>,
        tables: &mut NormalizedTables,
    ) -> Result<Value> {
        let mut record: Record = input.clone();

        for (field, def) in entity.relations() {
            let Some(value) = record.get(field).cloned() else {
                continue;
            };
            let replacement = if def.is_to_many() {
                self.decompose_many(ctx, persisted, def, &record, &value, tables)?
            } else {
                self.decompose_one(ctx, persisted, def, &record, &value, tables)?
            };
            match replacement {
                Some(marker) => record.insert(field.to_string(), marker),
                None => record.remove(field),
            };
        }

        let key = match key_of(&record, &entity.primary_key) {
            Some(key) => key,
            None => match increment::key_for_keyless(ctx, persisted, tables, entity) {
                Some((field, id)) => {
                    let value = Value::Number(id.into());
                    record.insert(field, value.clone());
                    Key::Scalar(value)
                }
                None => Key::Scalar(Value::String(ctx.synthetic_key())),
            },
        };
        record.insert(ID_FIELD.to_string(), key.witness());
        let marker = key.witness();
        tables.merge_record(entity.name.clone(), key.encode(), record);
        Ok(marker)
    }

    /// To-one field value: nested object recurses, anything else is already
    /// a key reference and is kept coerced. `None` drops the field (a nested
    /// record whose target entity cannot be resolved).
    fn decompose_one(
        &self,
        ctx: &mut NormalizeContext,
        persisted: &NormalizedTables,
        def: &RelationDef,
        owner: &Record,
        value: &Value,
        tables: &mut NormalizedTables,
    ) -> Result<Option<Value>> {
        match value {
            Value::Object(map) => {
                let Some(related) = self.related_entity_of(def, owner) else {
                    return Ok(None);
                };
                self.decompose_record(ctx, persisted, related, map, tables)
                    .map(Some)
            }
            Value::Array(parts) => Ok(Some(Value::Array(parts.iter().map(coerce).collect()))),
            other => Ok(Some(coerce(other))),
        }
    }

    /// To-many field value: nested objects recurse element-wise, a bare
    /// object is a one-element list, scalars pass through as references.
    fn decompose_many(
        &self,
        ctx: &mut NormalizeContext,
        persisted: &NormalizedTables,
        def: &RelationDef,
        owner: &Record,
        value: &Value,
        tables: &mut NormalizedTables,
    ) -> Result<Option<Value>> {
        let items: &[Value] = match value {
            Value::Array(items) => items,
            Value::Object(_) => std::slice::from_ref(value),
            other => return Ok(Some(coerce(other))),
        };

        let mut markers = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(map) => {
                    let Some(related) = self.related_entity_of(def, owner) else {
                        continue;
                    };
                    markers.push(self.decompose_record(ctx, persisted, related, map, tables)?);
                }
                other => markers.push(coerce(other)),
            }
        }
        Ok(Some(Value::Array(markers)))
    }

    /// The entity a relation field's nested records belong to. For the
    /// polymorphic owner kind the entity is named by the record's own type
    /// field; a missing or unregistered name resolves to `None`.
    fn related_entity_of(&self, def: &RelationDef, owner: &Record) -> Option<&'g EntityDef> {
        let name = match def {
            RelationDef::ToOne { related, .. }
            | RelationDef::ToMany { related, .. }
            | RelationDef::ManyToMany { related, .. }
            | RelationDef::PolyToOne { related, .. }
            | RelationDef::PolyToMany { related, .. } => related.as_str(),
            RelationDef::BelongsTo { parent, .. } => parent.as_str(),
            RelationDef::PolyOwner { type_field, .. } => owner.get(type_field)?.as_str()?,
        };
        self.graph.entity(name)
    }
}

fn is_empty_input(input: &Value) -> bool {
    match input {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
