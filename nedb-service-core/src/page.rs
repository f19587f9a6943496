//! Paginated `find` results and pagination settings.

use serde::{Deserialize, Serialize};

/// A page of `find` results.
///
/// `total` counts every record matching the filter, ignoring `limit` and `skip`.
///
/// ```ignore
/// let page = service.find(Params::from_query(json!({ "$limit": 2 }))).await?;
/// assert!(page.data.len() <= 2);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Number of records matching the filter.
    pub total: usize,
    /// The effective limit applied to this page.
    pub limit: usize,
    /// The number of matching records skipped before this page.
    pub skip: usize,
    /// The records of this page.
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(data: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(data)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total: 0,
            limit: 0,
            skip: 0,
            data: Vec::new(),
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    data: Vec<T>,
    total: usize,
    limit: Option<usize>,
    skip: usize,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given records.
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            total: 0,
            limit: None,
            skip: 0,
        }
    }

    /// Sets the total number of matching records.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total;
        self
    }

    /// Sets the limit applied to the page, `None` meaning unbounded.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the number of skipped records.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Builds the page. An unbounded page reports `total` as its limit.
    pub fn build(self) -> Page<T> {
        Page {
            total: self.total,
            limit: self.limit.unwrap_or(self.total),
            skip: self.skip,
            data: self.data,
        }
    }
}

/// Service-wide pagination settings.
///
/// `default` applies when a query has no `$limit`; `max` caps any limit.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Paginate {
    /// Limit used when the query has none.
    pub default: Option<usize>,
    /// Upper bound for any limit.
    pub max: Option<usize>,
}

impl Paginate {
    /// Creates pagination settings.
    pub fn new(default: Option<usize>, max: Option<usize>) -> Self {
        Self { default, max }
    }

    /// Resolves the limit for a query that asked for `requested`.
    pub fn effective_limit(&self, requested: Option<usize>) -> Option<usize> {
        let limit = requested.or(self.default);

        match (limit, self.max) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (None, Some(max)) => Some(max),
            (limit, None) => limit,
        }
    }
}
