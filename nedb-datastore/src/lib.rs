//! Embedded JSON document datastore.
//!
//! This crate provides [`EmbeddedStore`], an implementation of the
//! [`Datastore`](nedb_service_core::datastore::Datastore) trait that keeps records in
//! memory behind an async-aware read-write lock and, when given a filename, persists
//! them to an append-only datafile.
//!
//! # Features
//!
//! - **Mongo-style filters** - Comparison, membership, `$regex`, `$size`, `$exists` and logical operators over dotted paths
//! - **Sorting and projection** - Type-ranked ordering across mixed value types
//! - **Unique indexes** - Optional constraints on any field, persisted with the data
//! - **Durability** - Append-only datafile with compaction and corrupt-line tolerance
//! - **Timestamps** - Optional `createdAt` / `updatedAt` maintenance
//!
//! # Quick Start
//!
//! ```ignore
//! use nedb_datastore::EmbeddedStore;
//! use nedb_service_core::{datastore::{Datastore, DatastoreBuilder}, filter::{Filter, FindOptions}};
//! use serde_json::json;
//!
//! let store = EmbeddedStore::builder()
//!     .filename("db-data/people")
//!     .autoload(true)
//!     .build()
//!     .await?;
//!
//! store.insert(vec![json!({ "name": "Alice" }).as_object().cloned().unwrap()]).await?;
//! let alices = store.find(&Filter::eq("name", "Alice"), &FindOptions::default()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as nedb_datastore;

pub mod evaluator;
pub mod index;
mod persistence;
pub mod store;

pub use index::IndexOptions;
pub use store::{DatastoreOptions, EmbeddedStore, EmbeddedStoreBuilder};
