//! Raw introspection rows at the backend boundary.
//!
//! Each engine's driver labels result columns differently (`TABLE_NAME` vs
//! `table_name`, uppercase Oracle catalog names, lowercased bridge labels).
//! Backends package rows into [`RawRow`] without renaming anything; the
//! collector's normalizer resolves canonical fields against prioritized
//! candidate-key lists. `RawRow` never crosses the collector boundary.

use std::collections::HashMap;

use serde_json::Value;

/// An opaque mapping of driver-supplied column labels to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    values: HashMap<String, Value>,
}

impl RawRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a labeled value. Labels are stored verbatim.
    pub fn insert(&mut self, label: impl Into<String>, value: Value) {
        self.values.insert(label.into(), value);
    }

    /// Returns the value stored under `label`, if any.
    pub fn value(&self, label: &str) -> Option<&Value> {
        self.values.get(label)
    }

    /// Returns true when `label` is present with a non-null value.
    pub fn has(&self, label: &str) -> bool {
        matches!(self.values.get(label), Some(v) if !v.is_null())
    }

    /// Number of labeled values in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<L: Into<String>> FromIterator<(L, Value)> for RawRow {
    fn from_iter<T: IntoIterator<Item = (L, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(l, v)| (l.into(), v)).collect(),
        }
    }
}

/// Result of an arbitrary statement execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Rows from a read statement.
    Rows(Vec<RawRow>),
    /// Affected-row count from a non-read statement.
    Affected(u64),
}

impl QueryOutput {
    /// Unwraps the rows of a read statement, or an empty vec for a
    /// non-read result.
    pub fn into_rows(self) -> Vec<RawRow> {
        match self {
            Self::Rows(rows) => rows,
            Self::Affected(_) => Vec::new(),
        }
    }
}
