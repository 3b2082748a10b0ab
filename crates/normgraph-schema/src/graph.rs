//! The schema graph: a name-keyed registry of entity declarations with eager
//! registration-time validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityDef, Name};
use crate::relation::RelationDef;

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors reported eagerly by [`SchemaGraphBuilder::build`].
///
/// Data-shape problems (missing key values, absent foreign keys) are never
/// schema errors; they surface later as keyless records or empty matches.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate entity registration: `{0}`")]
    DuplicateEntity(Name),
    #[error("entity `{entity}`: relation `{field}` references unregistered entity `{related}`")]
    UnknownRelatedEntity {
        entity: Name,
        field: Name,
        related: Name,
    },
    #[error("entity `{entity}`: empty composite key declaration ({location})")]
    EmptyCompositeKey { entity: Name, location: String },
    #[error(
        "entity `{entity}`: relation `{field}` declares {foreign} foreign keys \
         but the primary key has {primary} fields"
    )]
    ForeignKeyArityMismatch {
        entity: Name,
        field: Name,
        foreign: usize,
        primary: usize,
    },
}

// ============================================================================
// Schema graph
// ============================================================================

/// Immutable registry of entity declarations, keyed by entity name.
///
/// Targets are resolved by name at traversal time, so registration order does
/// not matter and cycles are fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaGraph {
    entities: HashMap<Name, EntityDef>,
}

impl SchemaGraph {
    pub fn builder() -> SchemaGraphBuilder {
        SchemaGraphBuilder::default()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }
}

#[derive(Debug, Default)]
pub struct SchemaGraphBuilder {
    entities: Vec<EntityDef>,
}

impl SchemaGraphBuilder {
    pub fn register(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate every declaration against the full registry and seal it.
    pub fn build(self) -> Result<SchemaGraph, SchemaError> {
        let mut entities: HashMap<Name, EntityDef> = HashMap::with_capacity(self.entities.len());
        for def in self.entities {
            if entities.contains_key(&def.name) {
                return Err(SchemaError::DuplicateEntity(def.name));
            }
            entities.insert(def.name.clone(), def);
        }
        for def in entities.values() {
            validate_entity(&entities, def)?;
        }
        Ok(SchemaGraph { entities })
    }
}

fn validate_entity(registry: &HashMap<Name, EntityDef>, def: &EntityDef) -> Result<(), SchemaError> {
    if def.primary_key.fields().is_empty() {
        return Err(SchemaError::EmptyCompositeKey {
            entity: def.name.clone(),
            location: "primary key".into(),
        });
    }

    for (field, rel) in def.relations() {
        for related in rel.referenced_entities() {
            if !registry.contains_key(related) {
                return Err(SchemaError::UnknownRelatedEntity {
                    entity: def.name.clone(),
                    field: field.to_string(),
                    related: related.to_string(),
                });
            }
        }

        match rel {
            RelationDef::ToOne {
                foreign_key,
                local_key,
                ..
            }
            | RelationDef::ToMany {
                foreign_key,
                local_key,
                ..
            } => {
                if foreign_key.is_empty() {
                    return Err(SchemaError::EmptyCompositeKey {
                        entity: def.name.clone(),
                        location: format!("foreign key of `{field}`"),
                    });
                }
                // A composite foreign key fed from the default local key must
                // line up with the declared primary-key arity. An explicit
                // local key carries a joined value whose shape is only known
                // at normalization time.
                let primary = def.primary_key.fields().len();
                if local_key.is_none() && foreign_key.len() > 1 && primary > 1
                    && foreign_key.len() != primary
                {
                    return Err(SchemaError::ForeignKeyArityMismatch {
                        entity: def.name.clone(),
                        field: field.to_string(),
                        foreign: foreign_key.len(),
                        primary,
                    });
                }
            }
            RelationDef::PolyOwner { id_fields, .. } => {
                if id_fields.is_empty() {
                    return Err(SchemaError::EmptyCompositeKey {
                        entity: def.name.clone(),
                        location: format!("id fields of `{field}`"),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(())
}
