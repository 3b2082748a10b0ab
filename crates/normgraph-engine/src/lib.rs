//! In-memory normalization and relation resolution over schema-described
//! entity graphs.
//!
//! Nested record trees come in; flat per-entity tables keyed by encoded
//! primary keys come out, with relation fields reduced to key references.
//! Key behaviors:
//!
//! 1. **Key codec**: scalar and composite keys encode to table-key text,
//!    every record carries its key witness under `$id`
//! 2. **Pipeline**: decompose → pivot synthesis → attach → default fill →
//!    increment assignment, one pass each, in [`Normalizer`]
//! 3. **Dictionary matching**: read-time relation resolution groups
//!    candidates once per field instead of scanning per owner
//! 4. **Explicit context**: synthetic-key and increment state lives in a
//!    caller-owned [`NormalizeContext`], never in globals
//!
//! ## Module Organization
//!
//! - `key`: primary-key codec, `$id` witnesses, synthetic keys, coercion
//! - `tables`: the flat table set batches and stores exchange
//! - `context`: per-database mutable state
//! - `normalize`: the decompose pass and the pipeline entry point
//! - `pivot`: many-to-many pivot synthesis
//! - `relation`: key attachment and dictionary-based matching
//! - `fill` / `increment`: declared defaults and auto-increment values

pub mod context;
pub mod fill;
pub mod increment;
pub mod key;
pub mod normalize;
pub mod pivot;
pub mod relation;
pub mod tables;

// Re-export key types
pub use context::NormalizeContext;
pub use key::{coerce, key_of, Key, SyntheticKeys, ID_FIELD, SYNTHETIC_PREFIX};
pub use normalize::Normalizer;
pub use relation::{attach, attach_all, build_dictionary, load, RelatedSource};
pub use tables::{NormalizedTables, Record, RecordTable};
