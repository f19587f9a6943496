//! Per-call parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

/// Parameters accompanying a service call.
///
/// `query` carries filter conditions and the special `$sort`, `$limit`, `$skip`
/// and `$select` keys. `nedb` is the adapter-specific side channel.
///
/// ```ignore
/// use nedb_service_core::params::Params;
/// use serde_json::json;
///
/// let params = Params::from_query(json!({ "age": { "$gt": 18 }, "$limit": 10 }))
///     .with_upsert(true);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Query conditions and special keys.
    pub query: Record,
    /// Adapter-specific options.
    pub nedb: NedbParams,
}

/// Adapter-specific per-call options.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NedbParams {
    /// Insert a record on `update` when none exists for the id.
    pub upsert: bool,
}

impl Params {
    /// Empty parameters: no conditions, default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters with the given query. Non-object values yield an empty query.
    pub fn from_query(query: Value) -> Self {
        Self {
            query: match query {
                Value::Object(map) => map,
                _ => Record::new(),
            },
            nedb: NedbParams::default(),
        }
    }

    /// Sets the upsert flag consumed by `update`.
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.nedb.upsert = upsert;
        self
    }
}
