//! Relation descriptors.
//!
//! The taxonomy is a closed set of tagged variants; the engine dispatches its
//! attach and match passes over this enum through one surface, with no
//! open-ended subclassing. Key-placement rules per variant:
//!
//! - `ToOne` / `ToMany`: the *related* record carries the foreign key.
//! - `BelongsTo`: the *owner* record carries the foreign key to its parent.
//! - `ManyToMany`: neither side carries a key; a pivot entity holds one
//!   record per (owner, related) pair.
//! - `PolyToOne` / `PolyToMany`: the related record carries an id field plus
//!   a type field naming the owner's entity.
//! - `PolyOwner`: the inverse of the polymorphic pair; the owner record
//!   carries the id field(s) and the type field naming the target entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Name;

/// One declared relation.
///
/// `local_key`, `owner_key`, `parent_key`, and `related_key` default to the
/// relevant entity's primary key when `None`; a composite primary key
/// resolves to the `$id` witness field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationDef {
    /// One related record holds the foreign key back to the owner.
    ///
    /// `foreign_key` may list several fields; the owner's local-key value is
    /// then decomposed positionally across them.
    ToOne {
        related: Name,
        foreign_key: Vec<Name>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_key: Option<Name>,
    },
    /// The owner holds the foreign key to its parent.
    BelongsTo {
        parent: Name,
        foreign_key: Name,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_key: Option<Name>,
    },
    /// Many related records hold the foreign key back to the owner.
    ToMany {
        related: Name,
        foreign_key: Vec<Name>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_key: Option<Name>,
    },
    /// Linkage through a pivot entity holding one record per pair.
    ManyToMany {
        related: Name,
        pivot: Name,
        foreign_pivot_key: Name,
        related_pivot_key: Name,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_key: Option<Name>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_key: Option<Name>,
    },
    /// One related record keyed by (id field, type field) pointing at the
    /// owner.
    PolyToOne {
        related: Name,
        id_field: Name,
        type_field: Name,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_key: Option<Name>,
    },
    /// Many related records keyed by (id field, type field) pointing at the
    /// owner.
    PolyToMany {
        related: Name,
        id_field: Name,
        type_field: Name,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_key: Option<Name>,
    },
    /// The owning side of a polymorphic pair. The target entity is named by
    /// the record's type-field *value*, so no static target exists to
    /// validate; `id_fields` may be composite.
    PolyOwner {
        id_fields: Vec<Name>,
        type_field: Name,
    },
}

impl RelationDef {
    pub fn has_one(related: impl Into<Name>, foreign_key: impl Into<Name>) -> Self {
        RelationDef::ToOne {
            related: related.into(),
            foreign_key: vec![foreign_key.into()],
            local_key: None,
        }
    }

    pub fn belongs_to(parent: impl Into<Name>, foreign_key: impl Into<Name>) -> Self {
        RelationDef::BelongsTo {
            parent: parent.into(),
            foreign_key: foreign_key.into(),
            owner_key: None,
        }
    }

    pub fn has_one_composite<I, S>(related: impl Into<Name>, foreign_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        RelationDef::ToOne {
            related: related.into(),
            foreign_key: foreign_key.into_iter().map(Into::into).collect(),
            local_key: None,
        }
    }

    pub fn has_many(related: impl Into<Name>, foreign_key: impl Into<Name>) -> Self {
        RelationDef::ToMany {
            related: related.into(),
            foreign_key: vec![foreign_key.into()],
            local_key: None,
        }
    }

    pub fn has_many_composite<I, S>(related: impl Into<Name>, foreign_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        RelationDef::ToMany {
            related: related.into(),
            foreign_key: foreign_key.into_iter().map(Into::into).collect(),
            local_key: None,
        }
    }

    pub fn many_to_many(
        related: impl Into<Name>,
        pivot: impl Into<Name>,
        foreign_pivot_key: impl Into<Name>,
        related_pivot_key: impl Into<Name>,
    ) -> Self {
        RelationDef::ManyToMany {
            related: related.into(),
            pivot: pivot.into(),
            foreign_pivot_key: foreign_pivot_key.into(),
            related_pivot_key: related_pivot_key.into(),
            parent_key: None,
            related_key: None,
        }
    }

    pub fn morph_one(
        related: impl Into<Name>,
        id_field: impl Into<Name>,
        type_field: impl Into<Name>,
    ) -> Self {
        RelationDef::PolyToOne {
            related: related.into(),
            id_field: id_field.into(),
            type_field: type_field.into(),
            local_key: None,
        }
    }

    pub fn morph_many(
        related: impl Into<Name>,
        id_field: impl Into<Name>,
        type_field: impl Into<Name>,
    ) -> Self {
        RelationDef::PolyToMany {
            related: related.into(),
            id_field: id_field.into(),
            type_field: type_field.into(),
            local_key: None,
        }
    }

    pub fn morph_to(id_field: impl Into<Name>, type_field: impl Into<Name>) -> Self {
        RelationDef::PolyOwner {
            id_fields: vec![id_field.into()],
            type_field: type_field.into(),
        }
    }

    pub fn morph_to_composite<I, S>(id_fields: I, type_field: impl Into<Name>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        RelationDef::PolyOwner {
            id_fields: id_fields.into_iter().map(Into::into).collect(),
            type_field: type_field.into(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RelationDef::ToOne { .. } => "to_one",
            RelationDef::BelongsTo { .. } => "belongs_to",
            RelationDef::ToMany { .. } => "to_many",
            RelationDef::ManyToMany { .. } => "many_to_many",
            RelationDef::PolyToOne { .. } => "poly_to_one",
            RelationDef::PolyToMany { .. } => "poly_to_many",
            RelationDef::PolyOwner { .. } => "poly_owner",
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(
            self,
            RelationDef::ToMany { .. }
                | RelationDef::ManyToMany { .. }
                | RelationDef::PolyToMany { .. }
        )
    }

    /// Post-normalization placeholder, also the fill default: `[]` for
    /// to-many kinds, `null` for to-one kinds.
    pub fn empty_value(&self) -> Value {
        if self.is_to_many() {
            Value::Array(Vec::new())
        } else {
            Value::Null
        }
    }

    /// Entity names that must be registered for this relation to resolve.
    /// `PolyOwner` targets are data-driven and contribute none.
    pub fn referenced_entities(&self) -> Vec<&str> {
        match self {
            RelationDef::ToOne { related, .. }
            | RelationDef::ToMany { related, .. }
            | RelationDef::PolyToOne { related, .. }
            | RelationDef::PolyToMany { related, .. } => vec![related],
            RelationDef::BelongsTo { parent, .. } => vec![parent],
            RelationDef::ManyToMany { related, pivot, .. } => vec![related, pivot],
            RelationDef::PolyOwner { .. } => Vec::new(),
        }
    }
}
