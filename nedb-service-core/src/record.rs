//! Records and helpers for reading them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: an open-ended map of field names to JSON values.
pub type Record = Map<String, Value>;

/// Either a single value or an ordered sequence of values.
///
/// Used for payloads whose result keeps the shape of the input, such as
/// `create([a, b])` returning two records and `create(a)` returning one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single value.
    One(T),
    /// A sequence of values.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Returns `true` if this holds a single value.
    pub fn is_one(&self) -> bool {
        matches!(self, OneOrMany::One(_))
    }

    /// Flattens into a vector, regardless of shape.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    /// Returns the single value, or `None` for a sequence.
    pub fn into_one(self) -> Option<T> {
        match self {
            OneOrMany::One(item) => Some(item),
            OneOrMany::Many(_) => None,
        }
    }

    /// Returns the sequence, or `None` for a single value.
    pub fn into_many(self) -> Option<Vec<T>> {
        match self {
            OneOrMany::One(_) => None,
            OneOrMany::Many(items) => Some(items),
        }
    }

    /// Applies `f` to every contained value, keeping the shape.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            OneOrMany::One(item) => OneOrMany::One(f(item)),
            OneOrMany::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        OneOrMany::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

/// Resolves a dotted path (`"address.city"`) inside a record.
///
/// Numeric segments index into arrays.
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Keeps only the listed fields of a record. Dotted paths keep the nested value.
pub fn project(record: &Record, fields: &[String]) -> Record {
    let mut projected = Record::new();

    for field in fields {
        let Some(value) = get_path(record, field) else {
            continue;
        };

        let mut segments = field.split('.').peekable();
        let mut target = &mut projected;

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                target.insert(segment.to_string(), value.clone());
                break;
            }

            let entry = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            match entry {
                Value::Object(map) => target = map,
                _ => break,
            }
        }
    }

    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn resolves_nested_paths() {
        let rec = record(json!({ "a": { "b": [10, { "c": "deep" }] } }));

        assert_eq!(get_path(&rec, "a.b.0"), Some(&json!(10)));
        assert_eq!(get_path(&rec, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(get_path(&rec, "a.x"), None);
    }

    #[test]
    fn projects_flat_and_nested_fields() {
        let rec = record(json!({ "_id": "1", "name": "Alice", "address": { "city": "Oslo", "zip": 1 } }));
        let projected = project(&rec, &["_id".into(), "address.city".into(), "missing".into()]);

        assert_eq!(
            Value::Object(projected),
            json!({ "_id": "1", "address": { "city": "Oslo" } })
        );
    }

    #[test]
    fn one_or_many_keeps_shape() {
        let one: OneOrMany<i32> = 1.into();
        let many: OneOrMany<i32> = vec![1, 2].into();

        assert_eq!(one.map(|v| v * 2), OneOrMany::One(2));
        assert_eq!(many.map(|v| v * 2).into_vec(), vec![2, 4]);
    }
}
