//! Explicit normalization context: the synthetic-key counter and the
//! auto-increment cursors.

use ahash::AHashMap;

use crate::key::SyntheticKeys;

/// Mutable state carried across normalization calls against one logical
/// database.
///
/// Callers hold one context per database and pass it by `&mut`; exclusive
/// access is a compile-time fact, there are no hidden globals. The two
/// counters are independent: synthetic keys name keyless records, increment
/// cursors feed auto-increment fields, and each resets on its own.
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    synthetic: SyntheticKeys,
    cursors: AHashMap<(String, String), i64>,
}

impl NormalizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both counters.
    pub fn reset(&mut self) {
        self.reset_synthetic_keys();
        self.reset_increments();
    }

    /// Restart synthetic keys at `_no_key_1`.
    pub fn reset_synthetic_keys(&mut self) {
        self.synthetic.reset();
    }

    /// Forget every auto-increment cursor.
    pub fn reset_increments(&mut self) {
        self.cursors.clear();
    }

    pub(crate) fn synthetic_key(&mut self) -> String {
        self.synthetic.issue()
    }

    pub(crate) fn cursor_mut(&mut self, entity: &str, field: &str) -> &mut i64 {
        self.cursors
            .entry((entity.to_string(), field.to_string()))
            .or_insert(0)
    }
}
