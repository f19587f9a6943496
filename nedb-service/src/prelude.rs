//! Commonly used types in one import:
//!
//! ```ignore
//! use nedb_service::prelude::*;
//! ```

pub use nedb_service_core::{
    datastore::{Datastore, DatastoreBuilder},
    error::{ConfigurationError, ServiceError, ServiceResult, StoreError, StoreResult},
    filter::{Expr, FieldOp, Filter, FindOptions, Modifier, Sort, SortDirection},
    id::Id,
    page::{Page, Paginate},
    params::{NedbParams, Params},
    record::{OneOrMany, Record},
    service::{NedbService, Service, ServiceOptions},
};
