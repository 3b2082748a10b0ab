//! Entity descriptors: primary keys, fields, and the fluent declaration
//! surface used to register entities with a schema graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relation::RelationDef;

pub type Name = String;

// ============================================================================
// Primary keys
// ============================================================================

/// Primary-key declaration for an entity.
///
/// Composite keys are ordered: the declared field order is the canonical
/// order for key tuples, encoded table keys, and `$id` witnesses. The default
/// primary key is the single field `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum PrimaryKey {
    Single { field: Name },
    Composite { fields: Vec<Name> },
}

impl PrimaryKey {
    /// Key fields in declared order.
    pub fn fields(&self) -> &[Name] {
        match self {
            PrimaryKey::Single { field } => std::slice::from_ref(field),
            PrimaryKey::Composite { fields } => fields,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite { .. })
    }

    /// The key field, when the key is not composite.
    pub fn single_field(&self) -> Option<&str> {
        match self {
            PrimaryKey::Single { field } => Some(field),
            PrimaryKey::Composite { .. } => None,
        }
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::Single { field: "id".into() }
    }
}

// ============================================================================
// Fields
// ============================================================================

/// A plain attribute with a declared default value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttrDef {
    pub default: Value,
}

/// One declared field of an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum FieldDef {
    /// Plain attribute; the default fills in when input omits the field.
    Attr(AttrDef),
    /// Auto-increment integer attribute. Values are assigned by the engine's
    /// increment pass; an omitted value is `null` until then.
    Increment,
    /// Relation to one or more other entities.
    Relation(RelationDef),
}

impl FieldDef {
    pub fn as_relation(&self) -> Option<&RelationDef> {
        match self {
            FieldDef::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn is_increment(&self) -> bool {
        matches!(self, FieldDef::Increment)
    }

    /// Value installed by the fill pass when input omits the field.
    pub fn default_value(&self) -> Value {
        match self {
            FieldDef::Attr(attr) => attr.default.clone(),
            FieldDef::Increment => Value::Null,
            FieldDef::Relation(rel) => rel.empty_value(),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A declared entity: name, primary key, and fields in declaration order.
///
/// Declaring a field twice replaces the earlier declaration in place (last
/// declaration wins, position of the first is kept).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDef {
    pub name: Name,
    pub primary_key: PrimaryKey,
    pub fields: Vec<(Name, FieldDef)>,
}

impl EntityDef {
    pub fn new(name: impl Into<Name>) -> Self {
        EntityDef {
            name: name.into(),
            primary_key: PrimaryKey::default(),
            fields: Vec::new(),
        }
    }

    // --- declaration surface ------------------------------------------------

    pub fn key(mut self, field: impl Into<Name>) -> Self {
        self.primary_key = PrimaryKey::Single { field: field.into() };
        self
    }

    pub fn composite_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        self.primary_key = PrimaryKey::Composite {
            fields: fields.into_iter().map(Into::into).collect(),
        };
        self
    }

    pub fn attr(mut self, name: impl Into<Name>, default: impl Into<Value>) -> Self {
        self.set_field(
            name.into(),
            FieldDef::Attr(AttrDef {
                default: default.into(),
            }),
        );
        self
    }

    pub fn increment(mut self, name: impl Into<Name>) -> Self {
        self.set_field(name.into(), FieldDef::Increment);
        self
    }

    pub fn relation(mut self, name: impl Into<Name>, def: RelationDef) -> Self {
        self.set_field(name.into(), FieldDef::Relation(def));
        self
    }

    pub fn has_one(
        self,
        field: impl Into<Name>,
        related: impl Into<Name>,
        foreign_key: impl Into<Name>,
    ) -> Self {
        self.relation(field, RelationDef::has_one(related, foreign_key))
    }

    pub fn belongs_to(
        self,
        field: impl Into<Name>,
        parent: impl Into<Name>,
        foreign_key: impl Into<Name>,
    ) -> Self {
        self.relation(field, RelationDef::belongs_to(parent, foreign_key))
    }

    pub fn has_many(
        self,
        field: impl Into<Name>,
        related: impl Into<Name>,
        foreign_key: impl Into<Name>,
    ) -> Self {
        self.relation(field, RelationDef::has_many(related, foreign_key))
    }

    pub fn many_to_many(
        self,
        field: impl Into<Name>,
        related: impl Into<Name>,
        pivot: impl Into<Name>,
        foreign_pivot_key: impl Into<Name>,
        related_pivot_key: impl Into<Name>,
    ) -> Self {
        self.relation(
            field,
            RelationDef::many_to_many(related, pivot, foreign_pivot_key, related_pivot_key),
        )
    }

    pub fn morph_one(
        self,
        field: impl Into<Name>,
        related: impl Into<Name>,
        id_field: impl Into<Name>,
        type_field: impl Into<Name>,
    ) -> Self {
        self.relation(field, RelationDef::morph_one(related, id_field, type_field))
    }

    pub fn morph_many(
        self,
        field: impl Into<Name>,
        related: impl Into<Name>,
        id_field: impl Into<Name>,
        type_field: impl Into<Name>,
    ) -> Self {
        self.relation(
            field,
            RelationDef::morph_many(related, id_field, type_field),
        )
    }

    pub fn morph_to(
        self,
        field: impl Into<Name>,
        id_field: impl Into<Name>,
        type_field: impl Into<Name>,
    ) -> Self {
        self.relation(field, RelationDef::morph_to(id_field, type_field))
    }

    // --- accessors ----------------------------------------------------------

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, def)| def)
    }

    /// Relation fields in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationDef)> + '_ {
        self.fields
            .iter()
            .filter_map(|(name, def)| def.as_relation().map(|rel| (name.as_str(), rel)))
    }

    /// Auto-increment fields in declaration order.
    pub fn increment_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields
            .iter()
            .filter_map(|(name, def)| def.is_increment().then_some(name.as_str()))
    }

    fn set_field(&mut self, name: Name, def: FieldDef) {
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some(slot) => slot.1 = def,
            None => self.fields.push((name, def)),
        }
    }
}
