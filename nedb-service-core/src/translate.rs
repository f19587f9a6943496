//! Translation of generic service queries into the datastore's native form.
//!
//! A service query is a JSON object mixing filter conditions with a few special
//! keys:
//!
//! | key       | meaning                                  |
//! |-----------|------------------------------------------|
//! | `$sort`   | `{ field: 1 \| -1 }`, ordering           |
//! | `$limit`  | maximum number of records                |
//! | `$skip`   | number of records to skip                |
//! | `$select` | list of fields to return                 |
//!
//! Special keys are pulled out before the filter is built, so they never take part
//! in matching. Everything else becomes an [`Expr`]:
//!
//! - `field: value` is an equality condition,
//! - `field: { $op: value, ... }` is one condition per operator,
//! - `$or`, `$and` take a list of sub-queries and `$not` a single sub-query.
//!
//! Operator keys go through [`classify`]. Keys it does not know are passed through
//! as [`FieldOp::Other`] / [`Expr::Other`] and left for the datastore to judge.

use serde_json::Value;

use crate::{
    error::{ServiceError, ServiceResult},
    filter::{Expr, FieldOp, Sort, SortDirection},
    record::Record,
};

const SORT: &str = "$sort";
const LIMIT: &str = "$limit";
const SKIP: &str = "$skip";
const SELECT: &str = "$select";

/// A service query split into its native parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedQuery {
    /// The filter expression, free of special keys.
    pub filter: Expr,
    /// Sort keys in the order they were given.
    pub sort: Vec<Sort>,
    /// `$limit`, if present.
    pub limit: Option<usize>,
    /// `$skip`, if present.
    pub skip: Option<usize>,
    /// `$select`, if present.
    pub select: Option<Vec<String>>,
}

/// Outcome of classifying one operator key.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// A comparison the datastore understands, rewritten to its native operator.
    Known(FieldOp),
    /// Anything else, kept verbatim.
    Unknown(String),
}

/// Classifies a `$`-prefixed comparison key.
pub fn classify(key: &str) -> Operator {
    match key {
        "$eq" => Operator::Known(FieldOp::Eq),
        "$ne" => Operator::Known(FieldOp::Ne),
        "$gt" => Operator::Known(FieldOp::Gt),
        "$gte" => Operator::Known(FieldOp::Gte),
        "$lt" => Operator::Known(FieldOp::Lt),
        "$lte" => Operator::Known(FieldOp::Lte),
        "$in" => Operator::Known(FieldOp::In),
        "$nin" => Operator::Known(FieldOp::Nin),
        "$exists" => Operator::Known(FieldOp::Exists),
        "$regex" => Operator::Known(FieldOp::Regex),
        "$size" => Operator::Known(FieldOp::Size),
        other => Operator::Unknown(other.to_string()),
    }
}

/// Splits a service query into filter, sort, pagination and projection.
pub fn translate(query: &Record) -> ServiceResult<TranslatedQuery> {
    let mut translated = TranslatedQuery::default();
    let mut conditions = Record::new();

    for (key, value) in query {
        match key.as_str() {
            SORT => translated.sort = parse_sort(value)?,
            LIMIT => translated.limit = Some(parse_count(LIMIT, value)?),
            SKIP => translated.skip = Some(parse_count(SKIP, value)?),
            SELECT => translated.select = Some(parse_select(value)?),
            _ => {
                conditions.insert(key.clone(), value.clone());
            }
        }
    }

    translated.filter = translate_filter(&conditions)?;

    Ok(translated)
}

/// Builds a filter expression from query conditions (no special keys).
pub fn translate_filter(conditions: &Record) -> ServiceResult<Expr> {
    let mut filter = Expr::All;

    for (key, value) in conditions {
        let expr = match key.as_str() {
            "$or" => Expr::Or(sub_queries(key, value)?),
            "$and" => Expr::And(sub_queries(key, value)?),
            "$not" => match value {
                Value::Object(sub) => translate_filter(sub)?.not(),
                _ => return Err(bad_request(format!("{key} expects an object"))),
            },
            operator if operator.starts_with('$') => Expr::Other {
                operator: operator.to_string(),
                value: value.clone(),
            },
            field => translate_field(field, value)?,
        };

        filter = filter.and(expr);
    }

    Ok(filter)
}

fn translate_field(field: &str, value: &Value) -> ServiceResult<Expr> {
    let operators = match value {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => map,
        _ => return Ok(Expr::field(field, FieldOp::Eq, value.clone())),
    };

    if !operators.keys().all(|k| k.starts_with('$')) {
        return Err(bad_request(format!(
            "You cannot mix operators and normal fields in the condition on {field}"
        )));
    }

    let mut expr = Expr::All;

    for (key, operand) in operators {
        let op = match classify(key) {
            Operator::Known(op) => op,
            Operator::Unknown(name) => FieldOp::Other(name),
        };

        expr = expr.and(Expr::field(field, op, operand.clone()));
    }

    Ok(expr)
}

fn sub_queries(key: &str, value: &Value) -> ServiceResult<Vec<Expr>> {
    let Value::Array(items) = value else {
        return Err(bad_request(format!("{key} expects an array")));
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(sub) => translate_filter(sub),
            _ => Err(bad_request(format!("{key} expects an array of objects"))),
        })
        .collect()
}

fn parse_sort(value: &Value) -> ServiceResult<Vec<Sort>> {
    let Value::Object(keys) = value else {
        return Err(bad_request(format!("{SORT} expects an object")));
    };

    keys.iter()
        .map(|(field, direction)| {
            let direction = match integer(direction) {
                Some(1) => SortDirection::Asc,
                Some(-1) => SortDirection::Desc,
                _ => {
                    return Err(bad_request(format!(
                        "Invalid {SORT} direction for {field}: {direction}"
                    )));
                }
            };

            Ok(Sort { field: field.clone(), direction })
        })
        .collect()
}

fn parse_count(key: &str, value: &Value) -> ServiceResult<usize> {
    integer(value)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| bad_request(format!("Invalid {key}: {value}")))
}

fn parse_select(value: &Value) -> ServiceResult<Vec<String>> {
    match value {
        Value::String(field) => Ok(vec![field.clone()]),
        Value::Array(fields) => fields
            .iter()
            .map(|field| match field {
                Value::String(field) => Ok(field.clone()),
                other => Err(bad_request(format!("Invalid {SELECT} entry: {other}"))),
            })
            .collect(),
        other => Err(bad_request(format!("Invalid {SELECT}: {other}"))),
    }
}

/// Reads an integer from a JSON number or a numeric string (query strings arrive as text).
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bad_request(message: String) -> ServiceError {
    ServiceError::BadRequest(message)
}
