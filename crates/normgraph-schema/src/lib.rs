//! Entity and relation declarations for the normalization engine.
//!
//! This crate defines the descriptive half of normgraph: entities with their
//! primary keys and fields, the closed relation taxonomy, and the
//! [`SchemaGraph`] registry that ties them together.
//!
//! Design notes:
//! - Relation targets are stored as entity *names* and resolved against the
//!   graph lazily, so self-referential and mutually recursive schemas declare
//!   naturally.
//! - Validation is eager: [`SchemaGraphBuilder::build`] rejects configuration
//!   errors (unregistered targets, malformed composite-key declarations) up
//!   front. Data-shape problems are never schema errors; they surface at
//!   normalization time as keyless records or empty match results.

pub mod entity;
pub mod graph;
pub mod relation;

pub use entity::{AttrDef, EntityDef, FieldDef, Name, PrimaryKey};
pub use graph::{SchemaError, SchemaGraph, SchemaGraphBuilder};
pub use relation::RelationDef;
