//! Unique field constraints.
//!
//! Indexes here carry no lookup structure; queries always scan. What an index
//! adds is a constraint: a unique index rejects writes that would store the same
//! value twice under its field.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashSet;

use nedb_service_core::{
    error::{StoreError, StoreResult},
    record::{Record, get_path},
};

/// The field every record is keyed by. Always uniquely indexed.
pub const PRIMARY_KEY: &str = "_id";

/// Definition of an index on one field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    /// The indexed field or dotted path.
    pub field_name: String,
    /// Reject duplicate values.
    #[serde(default)]
    pub unique: bool,
    /// Ignore records that lack the field.
    #[serde(default)]
    pub sparse: bool,
}

impl IndexOptions {
    /// A non-unique, non-sparse index on `field_name`.
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            unique: false,
            sparse: false,
        }
    }

    /// Sets the unique flag.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets the sparse flag.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// The constraint key of a record under this index, `None` when the record is
    /// skipped (sparse index, field absent).
    fn key(&self, record: &Record) -> Option<String> {
        match get_path(record, &self.field_name) {
            Some(value) => Some(canonical_key(value)),
            None if self.sparse => None,
            None => Some("null".to_string()),
        }
    }

    /// Fails if `candidates` duplicate each other or any of `existing` under this index.
    pub(crate) fn check<'a>(
        &self,
        existing: impl IntoIterator<Item = &'a Record>,
        candidates: &[&Record],
    ) -> StoreResult<()> {
        if !self.unique {
            return Ok(());
        }

        let mut seen = existing
            .into_iter()
            .filter_map(|record| self.key(record))
            .collect::<HashSet<_>>();

        for candidate in candidates {
            if let Some(key) = self.key(candidate) {
                if !seen.insert(key.clone()) {
                    return Err(StoreError::UniqueViolation(key, self.field_name.clone()));
                }
            }
        }

        Ok(())
    }
}

/// Text form of a value in which numbers equal by value are equal by text,
/// so `1` and `1.0` collide the same way the matcher considers them equal.
pub(crate) fn canonical_key(value: &Value) -> String {
    normalize(value).to_string()
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), normalize(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}
