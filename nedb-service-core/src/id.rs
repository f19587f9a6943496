//! Record identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The identifier of a record.
///
/// Identifiers are usually strings generated by the datastore, but callers may
/// supply their own numeric identifiers through a custom id field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum Id {
    /// A string identifier.
    String(String),
    /// An integer identifier.
    Number(i64),
}

impl Id {
    /// Converts a JSON value into an identifier.
    ///
    /// Returns `None` for values that cannot identify a record (objects, arrays,
    /// booleans, null and non-integer numbers).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Id::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Id::Number),
            _ => None,
        }
    }

    /// Returns the identifier as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Id::String(s) => Value::String(s.clone()),
            Id::Number(n) => Value::from(*n),
        }
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Id::String(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "{s}"),
            Id::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::String(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::String(value)
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        id.to_value()
    }
}
