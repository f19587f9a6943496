//! Core of a CRUD service adapter over an embedded JSON document datastore.
//!
//! This crate provides:
//!
//! - **Service contract** ([`service`]) - The [`Service`](service::Service) trait and the datastore-backed [`NedbService`](service::NedbService)
//! - **Datastore contract** ([`datastore`]) - The trait an embedded store implements to back a service
//! - **Query translation** ([`translate`]) - Generic `$sort`/`$limit`/`$skip`/`$select` queries to native filters
//! - **Native filters** ([`filter`]) - Filter expressions, find options and update modifiers
//! - **Records and ids** ([`record`], [`id`]) - The record model and identifiers
//! - **Call parameters** ([`params`]) - Per-call query and adapter options such as upsert
//! - **Pages** ([`page`]) - Paginated `find` results and pagination settings
//! - **Error handling** ([`error`]) - Configuration, service and datastore errors
//!
//! # Example
//!
//! ```ignore
//! use nedb_service_core::{params::Params, service::{NedbService, Service, ServiceOptions}};
//! use serde_json::json;
//!
//! let service = NedbService::new(Some(ServiceOptions::builder().model(store).build()))?;
//! let page = service
//!     .find(Params::from_query(json!({ "age": { "$gte": 18 }, "$limit": 10 })))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as nedb_service_core;

pub mod datastore;
pub mod error;
pub mod filter;
pub mod id;
pub mod page;
pub mod params;
pub mod record;
pub mod service;
pub mod translate;
