//! Filter evaluation and value ordering for stored records.
//!
//! [`RecordMatcher`] decides whether a record satisfies a filter expression and
//! [`compare_values`] defines the total order used for sorting.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use nedb_service_core::{
    error::{StoreError, StoreResult},
    filter::{Expr, FieldOp, FilterVisitor, Sort, SortDirection},
    record::{Record, get_path},
};

/// Type rank used to order values of different JSON types.
///
/// A missing field sorts before `null`, then numbers, strings, booleans,
/// arrays and objects.
fn rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over optional JSON values.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Array(a)), Some(Value::Array(b))) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| compare_values(Some(x), Some(y)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Some(Value::Object(a)), Some(Value::Object(b))) => compare_objects(a, b),
        _ => rank(left).cmp(&rank(right)),
    }
}

fn compare_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    let mut left = a.iter().collect::<Vec<_>>();
    let mut right = b.iter().collect::<Vec<_>>();
    left.sort_by(|x, y| x.0.cmp(y.0));
    right.sort_by(|x, y| x.0.cmp(y.0));

    left.iter()
        .zip(right.iter())
        .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_values(Some(va), Some(vb))))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| left.len().cmp(&right.len()))
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Orders two records by a list of sort keys.
pub fn compare_records(left: &Record, right: &Record, sort: &[Sort]) -> Ordering {
    for key in sort {
        let ordering = compare_values(get_path(left, &key.field), get_path(right, &key.field));
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Evaluates filter expressions against a single record.
pub(crate) struct RecordMatcher<'a> {
    record: &'a Record,
}

impl<'a> RecordMatcher<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    pub fn matches(&mut self, expr: &Expr) -> StoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Keeps the records matching `expr`, failing on the first evaluation error.
    pub fn filter_records<I>(records: I, expr: &Expr) -> StoreResult<Vec<&'a Record>>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut matched = Vec::new();

        for record in records {
            if RecordMatcher::new(record).matches(expr)? {
                matched.push(record);
            }
        }

        Ok(matched)
    }
}

/// Applies `test` to the field value, or to each of its elements when the field
/// is an array and the operand is not.
fn any_element(field: &Value, operand: &Value, test: impl Fn(&Value) -> bool) -> bool {
    match field {
        Value::Array(items) if !operand.is_array() => items.iter().any(&test) || test(field),
        _ => test(field),
    }
}

fn equals(field: Option<&Value>, operand: &Value) -> bool {
    match field {
        Some(field) => any_element(field, operand, |value| values_equal(value, operand)),
        None => false,
    }
}

/// Only numbers with numbers and strings with strings are ordered by `$lt` and friends.
fn comparable(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            Some(compare_values(Some(left), Some(right)))
        }
        _ => None,
    }
}

fn operand_list<'v>(op: &FieldOp, operand: &'v Value) -> StoreResult<&'v Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidOperand(op.key().to_string(), "expected an array".to_string()))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl<'a> FilterVisitor for RecordMatcher<'a> {
    type Output = bool;
    type Error = StoreError;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(true)
    }

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, operand: &Value) -> Result<Self::Output, Self::Error> {
        let value = get_path(self.record, field);

        match op {
            FieldOp::Eq => Ok(equals(value, operand)),
            FieldOp::Ne => Ok(!equals(value, operand)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let accepts: fn(Ordering) -> bool = match op {
                    FieldOp::Gt => Ordering::is_gt,
                    FieldOp::Gte => Ordering::is_ge,
                    FieldOp::Lt => Ordering::is_lt,
                    _ => Ordering::is_le,
                };

                Ok(value.is_some_and(|value| {
                    any_element(value, operand, |item| comparable(item, operand).is_some_and(accepts))
                }))
            }
            FieldOp::In => {
                let candidates = operand_list(op, operand)?;
                Ok(candidates.iter().any(|candidate| equals(value, candidate)))
            }
            FieldOp::Nin => {
                let candidates = operand_list(op, operand)?;
                Ok(!candidates.iter().any(|candidate| equals(value, candidate)))
            }
            FieldOp::Exists => Ok(value.is_some() == truthy(operand)),
            FieldOp::Regex => {
                let pattern = operand.as_str().ok_or_else(|| {
                    StoreError::InvalidOperand(op.key().to_string(), "expected a string pattern".to_string())
                })?;
                let regex = Regex::new(pattern)
                    .map_err(|e| StoreError::InvalidOperand(op.key().to_string(), e.to_string()))?;

                Ok(value.is_some_and(|value| {
                    any_element(value, operand, |item| item.as_str().is_some_and(|s| regex.is_match(s)))
                }))
            }
            FieldOp::Size => {
                let size = operand.as_u64().ok_or_else(|| {
                    StoreError::InvalidOperand(op.key().to_string(), "expected a non-negative integer".to_string())
                })?;

                Ok(matches!(value, Some(Value::Array(items)) if items.len() as u64 == size))
            }
            FieldOp::Other(name) => Err(StoreError::UnknownComparison(name.clone())),
        }
    }

    fn visit_other(&mut self, operator: &str, _value: &Value) -> Result<Self::Output, Self::Error> {
        Err(StoreError::UnknownLogicalOperator(operator.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nedb_service_core::filter::Filter;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn matches(rec: &Value, expr: &Expr) -> bool {
        RecordMatcher::new(&record(rec.clone())).matches(expr).unwrap()
    }

    #[test]
    fn equality_handles_numbers_arrays_and_nesting() {
        let rec = json!({ "age": 30, "tags": ["a", "b"], "address": { "city": "Oslo" } });

        assert!(matches(&rec, &Filter::eq("age", 30.0)));
        assert!(matches(&rec, &Filter::eq("tags", "b")));
        assert!(matches(&rec, &Filter::eq("tags", json!(["a", "b"]))));
        assert!(matches(&rec, &Filter::eq("address.city", "Oslo")));
        assert!(!matches(&rec, &Filter::eq("missing", Value::Null)));
        assert!(matches(&rec, &Filter::ne("missing", 1)));
    }

    #[test]
    fn comparisons_only_between_like_types() {
        let rec = json!({ "age": 30, "name": "Bob" });

        assert!(matches(&rec, &Filter::gt("age", 25)));
        assert!(matches(&rec, &Filter::lte("age", 30)));
        assert!(!matches(&rec, &Filter::lt("age", "40")));
        assert!(matches(&rec, &Filter::gte("name", "Alice")));
        assert!(!matches(&rec, &Filter::gt("missing", 0)));
    }

    #[test]
    fn range_operators_at_the_boundary() {
        let rec = json!({ "age": 30, "scores": [10, 20] });

        assert!(!matches(&rec, &Filter::gt("age", 30)));
        assert!(matches(&rec, &Filter::gte("age", 30)));
        assert!(!matches(&rec, &Filter::lt("age", 30)));
        assert!(matches(&rec, &Filter::lte("age", 30)));
        assert!(matches(&rec, &Filter::gt("scores", 15)));
        assert!(!matches(&rec, &Filter::lt("scores", 10)));
    }

    #[test]
    fn membership_and_existence() {
        let rec = json!({ "role": "admin", "tags": ["x"] });

        assert!(matches(&rec, &Filter::any_of("role", vec![json!("admin"), json!("owner")])));
        assert!(matches(&rec, &Filter::none_of("role", vec![json!("guest")])));
        assert!(matches(&rec, &Filter::none_of("missing", vec![json!(1)])));
        assert!(matches(&rec, &Filter::exists("tags")));
        assert!(matches(&rec, &Expr::field("missing", FieldOp::Exists, false)));
        assert!(matches(&rec, &Expr::field("tags", FieldOp::Size, 1)));
        assert!(matches(&rec, &Expr::field("role", FieldOp::Regex, "^ad")));
    }

    #[test]
    fn logical_operators_combine() {
        let rec = json!({ "a": 1, "b": 2 });

        assert!(matches(&rec, &Filter::or([Filter::eq("a", 5), Filter::eq("b", 2)])));
        assert!(!matches(&rec, &Filter::and([Filter::eq("a", 1), Filter::eq("b", 3)])));
        assert!(matches(&rec, &Filter::eq("a", 2).not()));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let rec = record(json!({ "a": 1 }));

        let err = RecordMatcher::new(&rec)
            .matches(&Expr::field("a", FieldOp::Other("$elemMatch".into()), 1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown comparison function $elemMatch");

        let err = RecordMatcher::new(&rec)
            .matches(&Expr::Other { operator: "$where".into(), value: json!("x") })
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown logical operator $where");

        let err = RecordMatcher::new(&rec)
            .matches(&Expr::field("a", FieldOp::In, 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidOperand(_, _)));
    }

    #[test]
    fn orders_across_types() {
        let values = [json!({ "a": 1 }), json!([1]), json!(true), json!("s"), json!(2), Value::Null];
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| compare_values(Some(a), Some(b)));

        assert_eq!(
            sorted,
            vec![Value::Null, json!(2), json!("s"), json!(true), json!([1]), json!({ "a": 1 })]
        );
        assert_eq!(compare_values(None, Some(&Value::Null)), Ordering::Less);
    }
}
