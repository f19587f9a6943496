//! The datastore's native query form.
//!
//! Generic service queries are translated into these types by
//! [`translate`](crate::translate). Datastores evaluate them, typically through a
//! [`FilterVisitor`].
//!
//! ```ignore
//! use nedb_service_core::filter::{Filter, FindOptions, SortDirection};
//!
//! let filter = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
//! let options = FindOptions::builder()
//!     .sort("age", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```

use serde_json::Value;

use crate::{error::StoreError, record::Record};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field (or dotted path) to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators understood by the datastore.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// `$eq`, also used for plain `field: value` entries.
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
    /// `$in`: value is one of the listed values.
    In,
    /// `$nin`: value is none of the listed values.
    Nin,
    /// `$exists`: field presence.
    Exists,
    /// `$regex`: string field matches the pattern.
    Regex,
    /// `$size`: array field length.
    Size,
    /// An operator the translator did not recognise, passed through unchanged
    /// (including its `$` prefix). The datastore decides what to do with it.
    Other(String),
}

impl FieldOp {
    /// The operator key as written in a query, e.g. `"$gte"`.
    pub fn key(&self) -> &str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
            FieldOp::Exists => "$exists",
            FieldOp::Regex => "$regex",
            FieldOp::Size => "$size",
            FieldOp::Other(name) => name,
        }
    }
}

/// A filter expression over records.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Expr {
    /// Matches every record.
    #[default]
    All,
    /// Logical AND (all must match).
    And(Vec<Expr>),
    /// Logical OR (any must match).
    Or(Vec<Expr>),
    /// Logical NOT.
    Not(Box<Expr>),
    /// A field comparison.
    Field {
        /// Field name or dotted path.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The operand.
        value: Value,
    },
    /// A top-level operator the translator did not recognise, passed through
    /// unchanged for the datastore to accept or reject.
    Other {
        /// The operator key, including its `$` prefix.
        operator: String,
        /// The raw operand.
        value: Value,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Value>) -> Self {
        Expr::Field { field: field.into(), op, value: value.into() }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// `All` is the identity, and an existing AND list is extended in place.
    pub fn and(self, other: Expr) -> Self {
        match (self, other) {
            (Expr::All, other) => other,
            (this, Expr::All) => this,
            (Expr::And(mut list), other) => {
                list.push(other);
                Expr::And(list)
            }
            (this, other) => Expr::And(vec![this, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Shorthand constructors for filter expressions.
pub struct Filter;

impl Filter {
    /// Matches every record.
    pub fn all() -> Expr {
        Expr::All
    }

    /// Field equals value.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field, FieldOp::Eq, value)
    }

    /// Field does not equal value.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field, FieldOp::Ne, value)
    }

    /// Field is greater than value.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field, FieldOp::Gt, value)
    }

    /// Field is greater than or equal to value.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field, FieldOp::Gte, value)
    }

    /// Field is less than value.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field, FieldOp::Lt, value)
    }

    /// Field is less than or equal to value.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field, FieldOp::Lte, value)
    }

    /// Field is one of `values`.
    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Expr {
        Expr::field(field, FieldOp::In, Value::Array(values))
    }

    /// Field is none of `values`.
    pub fn none_of(field: impl Into<String>, values: Vec<Value>) -> Expr {
        Expr::field(field, FieldOp::Nin, Value::Array(values))
    }

    /// Field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::field(field, FieldOp::Exists, true)
    }

    /// All expressions match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression matches.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Options for a datastore `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort keys in priority order. Empty keeps the store's default ordering.
    pub sort: Vec<Sort>,
    /// Number of matching records to skip.
    pub skip: Option<usize>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Fields to keep in each returned record. `None` returns whole records.
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    /// Creates a builder for find options.
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }
}

/// Builder for [`FindOptions`].
#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Sets the number of records to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Sets the maximum number of records to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Restricts returned records to the given fields.
    pub fn projection(mut self, fields: Vec<String>) -> Self {
        self.options.projection = Some(fields);
        self
    }

    /// Builds the options.
    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// How a datastore `update` changes the matched records.
///
/// There is deliberately no upsert flag: a datastore only updates what exists.
#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    /// Replace every field except `_id` with the given record.
    Replace(Record),
    /// Set the given fields (dotted paths allowed), keeping the rest.
    Set(Record),
    /// Remove the given fields.
    Unset(Vec<String>),
}

pub trait FilterVisitor {
    type Output;
    type Error: Into<StoreError>;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_other(&mut self, operator: &str, value: &Value) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::All => self.visit_all(),
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
            Expr::Other { operator, value } => self.visit_other(operator, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_treats_all_as_identity() {
        let expr = Filter::all().and(Filter::eq("a", 1));
        assert_eq!(expr, Filter::eq("a", 1));

        let expr = Filter::eq("a", 1).and(Filter::all());
        assert_eq!(expr, Filter::eq("a", 1));
    }

    #[test]
    fn and_extends_existing_list() {
        let expr = Filter::eq("a", 1).and(Filter::eq("b", 2)).and(Filter::eq("c", 3));

        match expr {
            Expr::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }
}
