//! The datastore handle contract.
//!
//! A [`Datastore`] is the embedded store a service delegates all persistence to.
//! It owns indexing, durability and the serialization of concurrent writes; the
//! service only translates calls into the primitives below.
//!
//! The primitives are intentionally narrow. There is no upsert and no "update or
//! fail" variant: `update` reports how many records it touched and leaves the
//! interpretation to the caller.
//!
//! ```ignore
//! use nedb_service_core::{datastore::Datastore, filter::{Filter, FindOptions}};
//! use serde_json::json;
//!
//! let inserted = store
//!     .insert(vec![json!({ "name": "Alice" }).as_object().cloned().unwrap()])
//!     .await?;
//! let found = store.find(&Filter::eq("name", "Alice"), &FindOptions::default()).await?;
//! ```

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::StoreResult,
    filter::{Expr, FindOptions, Modifier},
    record::Record,
};

/// Abstract interface of an embedded document datastore.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` and safe to call from concurrent tasks.
/// Writes are expected to be serialized by the implementation itself.
///
/// # Ordering
///
/// `find` without sort keys returns records in the datastore's own default order.
/// Callers must not assume that order matches insertion order.
#[async_trait]
pub trait Datastore: Send + Sync + Debug {
    /// Counts the records matching `filter`.
    async fn count(&self, filter: &Expr) -> StoreResult<usize>;

    /// Returns the records matching `filter`, sorted, paginated and projected
    /// according to `options`.
    async fn find(&self, filter: &Expr, options: &FindOptions) -> StoreResult<Vec<Record>>;

    /// Inserts records, assigning an `_id` to each record that lacks one.
    ///
    /// Returns the records as stored. Either every record is inserted or none is.
    async fn insert(&self, records: Vec<Record>) -> StoreResult<Vec<Record>>;

    /// Applies `modifier` to the first matching record, or to every matching
    /// record when `multi` is set. Returns the number of records updated.
    async fn update(&self, filter: &Expr, modifier: Modifier, multi: bool) -> StoreResult<usize>;

    /// Removes the first matching record, or every matching record when `multi`
    /// is set. Returns the number of records removed.
    async fn remove(&self, filter: &Expr, multi: bool) -> StoreResult<usize>;
}

/// Builder for creating a configured [`Datastore`].
///
/// Building may touch the filesystem (loading a datafile), hence async and fallible.
#[async_trait]
pub trait DatastoreBuilder: Send + Sized {
    /// The datastore type this builder creates.
    type Datastore: Datastore;

    /// Builds the datastore.
    async fn build(self) -> StoreResult<Self::Datastore>;
}

#[async_trait]
impl<D: Datastore + ?Sized> Datastore for Arc<D> {
    async fn count(&self, filter: &Expr) -> StoreResult<usize> {
        (**self).count(filter).await
    }

    async fn find(&self, filter: &Expr, options: &FindOptions) -> StoreResult<Vec<Record>> {
        (**self).find(filter, options).await
    }

    async fn insert(&self, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        (**self).insert(records).await
    }

    async fn update(&self, filter: &Expr, modifier: Modifier, multi: bool) -> StoreResult<usize> {
        (**self).update(filter, modifier, multi).await
    }

    async fn remove(&self, filter: &Expr, multi: bool) -> StoreResult<usize> {
        (**self).remove(filter, multi).await
    }
}
