//! Key codec: canonical record keys, encoded table keys, and `$id` witnesses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use normgraph_schema::PrimaryKey;

use crate::tables::Record;

/// Field carrying the key witness on every normalized record.
pub const ID_FIELD: &str = "$id";

/// Prefix of synthetic keys issued to keyless records.
pub const SYNTHETIC_PREFIX: &str = "_no_key_";

/// A record key: one scalar or an ordered tuple of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Scalar(Value),
    Composite(Vec<Value>),
}

impl Key {
    /// Canonical table-key text. Scalars use their plain text form; composite
    /// keys use compact JSON array text (`[2,1]`), preserving declared field
    /// order.
    pub fn encode(&self) -> String {
        match self {
            Key::Scalar(Value::String(text)) => text.clone(),
            Key::Scalar(value) => value.to_string(),
            Key::Composite(parts) => Value::Array(parts.clone()).to_string(),
        }
    }

    /// The `$id` witness value: the scalar itself, or the ordered tuple as a
    /// JSON array.
    pub fn witness(&self) -> Value {
        match self {
            Key::Scalar(value) => value.clone(),
            Key::Composite(parts) => Value::Array(parts.clone()),
        }
    }
}

/// Coerce numeric strings to integers so the numeric and string spellings of
/// one id stay equivalent. Everything else passes through unchanged.
pub fn coerce(value: &Value) -> Value {
    if let Value::String(text) = value {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    value.clone()
}

fn scalar_part(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) | Value::Number(_) => Some(coerce(value)),
        _ => None,
    }
}

/// Compute a record's key from its primary-key declaration. `None` marks the
/// record keyless: some required field is absent or not a scalar.
pub fn key_of(record: &Record, primary_key: &PrimaryKey) -> Option<Key> {
    match primary_key {
        PrimaryKey::Single { field } => scalar_part(record.get(field)?).map(Key::Scalar),
        PrimaryKey::Composite { fields } => {
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                parts.push(scalar_part(record.get(field)?)?);
            }
            Some(Key::Composite(parts))
        }
    }
}

/// Text form of one scalar as used in `_`-joined dictionary keys.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn is_synthetic(key: &str) -> bool {
    key.starts_with(SYNTHETIC_PREFIX)
}

pub(crate) fn synthetic_ordinal(key: &str) -> Option<u64> {
    key.strip_prefix(SYNTHETIC_PREFIX)?.parse().ok()
}

/// Sequential synthetic keys for keyless records. Independent of the
/// auto-increment cursors; restarts only on explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticKeys {
    next: u64,
}

impl SyntheticKeys {
    pub fn issue(&mut self) -> String {
        self.next += 1;
        format!("{SYNTHETIC_PREFIX}{}", self.next)
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
