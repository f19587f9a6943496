//! CRUD service adapter over an embedded JSON document datastore.
//!
//! This crate is the entry point of the workspace. It re-exports the service and
//! query translation from `nedb-service-core` and, with the default `datastore`
//! feature, the embedded store from `nedb-datastore`.
//!
//! # Quick Start
//!
//! ```ignore
//! use nedb_service::{prelude::*, datastore::EmbeddedStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EmbeddedStore::builder()
//!         .filename("db-data/people")
//!         .autoload(true)
//!         .build()
//!         .await?;
//!
//!     let people = NedbService::new(Some(ServiceOptions::builder().model(store).build()))?;
//!
//!     let data: OneOrMany<Record> = serde_json::from_value(json!([
//!         { "name": "Alice", "age": 30 },
//!         { "name": "Bob", "age": 25 },
//!     ]))?;
//!     people.create(data, Params::new()).await?;
//!
//!     let page = people
//!         .find(Params::from_query(json!({ "$sort": { "age": 1 }, "$limit": 1 })))
//!         .await?;
//!
//!     println!("youngest of {}: {:?}", page.total, page.data);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Upserts
//!
//! `update` on a missing id fails with [`ServiceError::NotFound`](error::ServiceError::NotFound)
//! unless the call parameters ask for an upsert:
//!
//! ```ignore
//! let record = people
//!     .update(Id::from("alice"), record, Params::new().with_upsert(true))
//!     .await?;
//! ```
//!
//! # Any datastore
//!
//! [`NedbService`](service::NedbService) is generic over
//! [`Datastore`](datastore_api::Datastore); anything implementing the trait can back a
//! service, for example a shared `Arc<EmbeddedStore>`.

pub mod prelude;

pub use nedb_service_core::{error, filter, id, page, params, record, service, translate};

/// The datastore contract.
pub mod datastore_api {
    pub use nedb_service_core::datastore::{Datastore, DatastoreBuilder};
}

/// Embedded datastore implementation.
///
/// This module is only available when the `datastore` feature is enabled.
#[cfg(feature = "datastore")]
pub mod datastore {
    pub use nedb_datastore::{DatastoreOptions, EmbeddedStore, EmbeddedStoreBuilder, IndexOptions};
}
