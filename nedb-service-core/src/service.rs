//! The CRUD service contract and its datastore-backed implementation.
//!
//! [`Service`] is the method surface a web framework expects from a pluggable
//! service backend. [`NedbService`] implements it on top of any [`Datastore`]:
//! queries are translated with [`translate`], store results are reshaped into
//! records and pages, and two behaviours the store lacks are emulated here:
//!
//! - **upsert on update**: `update` checks for the record first and inserts it
//!   when [`NedbParams::upsert`](crate::params::NedbParams::upsert) is set;
//! - **multi-record patch/remove**: with no id, `patch` and `remove` act on every
//!   record matching the query.
//!
//! # Example
//!
//! ```ignore
//! use nedb_service::prelude::*;
//! use serde_json::json;
//!
//! let service = NedbService::new(Some(
//!     ServiceOptions::builder().model(store).build(),
//! ))?;
//!
//! let alice: Record = serde_json::from_value(json!({ "name": "Alice", "age": 30 }))?;
//! service.create(alice.into(), Params::new()).await?;
//!
//! let page = service
//!     .find(Params::from_query(json!({ "$sort": { "age": 1 } })))
//!     .await?;
//! ```

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::{
    datastore::Datastore,
    error::{ConfigurationError, ServiceError, ServiceResult},
    filter::{Expr, FieldOp, Filter, FindOptions, Modifier},
    id::Id,
    page::{Page, Paginate},
    params::Params,
    record::{OneOrMany, Record, project},
    translate::translate,
};

/// The identifier field used by default, matching the datastore's primary key.
pub const DEFAULT_ID_FIELD: &str = "_id";

/// The standard CRUD method surface of a service.
///
/// Every method resolves exactly once, either to its result or to a
/// [`ServiceError`].
#[async_trait]
pub trait Service: Send + Sync {
    /// Returns a page of records matching `params.query`.
    async fn find(&self, params: Params) -> ServiceResult<Page<Record>>;

    /// Returns the record with the given id.
    async fn get(&self, id: Id, params: Params) -> ServiceResult<Record>;

    /// Creates one or many records, keeping the shape of `data` in the result.
    async fn create(
        &self,
        data: OneOrMany<Record>,
        params: Params,
    ) -> ServiceResult<OneOrMany<Record>>;

    /// Replaces the record with the given id.
    ///
    /// With `params.nedb.upsert` a missing record is inserted instead. A record
    /// that exists but does not match `params.query` is reported as not found and
    /// never upserted over.
    async fn update(&self, id: Id, data: Record, params: Params) -> ServiceResult<Record>;

    /// Merges `data` into the record with the given id, or into every record
    /// matching `params.query` when `id` is `None`.
    async fn patch(
        &self,
        id: Option<Id>,
        data: Record,
        params: Params,
    ) -> ServiceResult<OneOrMany<Record>>;

    /// Removes the record with the given id, or every record matching
    /// `params.query` when `id` is `None`. Returns the removed records.
    async fn remove(&self, id: Option<Id>, params: Params) -> ServiceResult<OneOrMany<Record>>;
}

/// Options for constructing a [`NedbService`].
///
/// `model` is the datastore handle and is required. `id` names the identifier
/// field and defaults to `"_id"`.
#[derive(Debug, Clone)]
pub struct ServiceOptions<D> {
    /// The datastore handle.
    pub model: Option<D>,
    /// The identifier field name.
    pub id: String,
    /// Custom event names the service publishes besides the standard ones.
    pub events: Vec<String>,
    /// Pagination defaults for `find`.
    pub paginate: Option<Paginate>,
}

impl<D> Default for ServiceOptions<D> {
    fn default() -> Self {
        Self {
            model: None,
            id: DEFAULT_ID_FIELD.to_string(),
            events: Vec::new(),
            paginate: None,
        }
    }
}

impl<D> ServiceOptions<D> {
    /// Creates a builder for service options.
    pub fn builder() -> ServiceOptionsBuilder<D> {
        ServiceOptionsBuilder::new()
    }
}

/// Builder for [`ServiceOptions`].
#[derive(Debug)]
pub struct ServiceOptionsBuilder<D> {
    options: ServiceOptions<D>,
}

impl<D> ServiceOptionsBuilder<D> {
    /// Creates a builder with default options and no datastore.
    pub fn new() -> Self {
        Self { options: ServiceOptions::default() }
    }

    /// Sets the datastore handle.
    pub fn model(mut self, model: D) -> Self {
        self.options.model = Some(model);
        self
    }

    /// Sets the identifier field name.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.options.id = id.into();
        self
    }

    /// Sets the custom event names.
    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the pagination defaults.
    pub fn paginate(mut self, paginate: Paginate) -> Self {
        self.options.paginate = Some(paginate);
        self
    }

    /// Builds the options.
    pub fn build(self) -> ServiceOptions<D> {
        self.options
    }
}

impl<D> Default for ServiceOptionsBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Service`] backed by a [`Datastore`].
///
/// The service holds nothing but its immutable configuration, so concurrent calls
/// are safe whenever the datastore is.
#[derive(Debug)]
pub struct NedbService<D: Datastore> {
    model: D,
    id: String,
    events: Vec<String>,
    paginate: Paginate,
}

impl<D: Datastore> NedbService<D> {
    /// Creates a service from its options.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::MissingOptions`] when `options` is `None`, and
    /// [`ConfigurationError::MissingModel`] when no datastore handle is set.
    pub fn new(options: Option<ServiceOptions<D>>) -> Result<Self, ConfigurationError> {
        let options = options.ok_or(ConfigurationError::MissingOptions)?;
        let model = options.model.ok_or(ConfigurationError::MissingModel)?;

        Ok(Self {
            model,
            id: options.id,
            events: options.events,
            paginate: options.paginate.unwrap_or_default(),
        })
    }

    /// The datastore handle.
    pub fn model(&self) -> &D {
        &self.model
    }

    /// The identifier field name.
    pub fn id_field(&self) -> &str {
        &self.id
    }

    /// The custom event names.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// The pagination defaults.
    pub fn paginate(&self) -> &Paginate {
        &self.paginate
    }

    fn id_filter(&self, id: &Id) -> Expr {
        Filter::eq(self.id.as_str(), id.to_value())
    }

    /// Narrows to exactly one stored record, preferring the store's own key.
    fn record_filter(&self, record: &Record, id: &Id) -> Expr {
        match record.get(DEFAULT_ID_FIELD) {
            Some(key) => Filter::eq(DEFAULT_ID_FIELD, key.clone()),
            None => self.id_filter(id),
        }
    }

    /// `$select` always keeps the identifier field.
    fn projection(&self, select: Option<Vec<String>>) -> Option<Vec<String>> {
        select.map(|mut fields| {
            if !fields.iter().any(|field| field == &self.id) {
                fields.push(self.id.clone());
            }
            fields
        })
    }

    fn select(&self, record: Record, projection: Option<&[String]>) -> Record {
        match projection {
            Some(fields) => project(&record, fields),
            None => record,
        }
    }

    /// Drops identifier fields from a payload; identifiers never change once assigned.
    fn strip_ids(&self, mut data: Record) -> Record {
        data.remove(&self.id);
        data.remove(DEFAULT_ID_FIELD);
        data
    }

    fn with_id(&self, mut record: Record) -> Record {
        if self.id != DEFAULT_ID_FIELD && !record.contains_key(&self.id) {
            record.insert(self.id.clone(), Id::generate().to_value());
        }
        record
    }

    async fn find_first(&self, filter: &Expr, projection: Option<Vec<String>>) -> ServiceResult<Option<Record>> {
        let options = FindOptions {
            limit: Some(1),
            projection,
            ..FindOptions::default()
        };

        Ok(self.model.find(filter, &options).await?.into_iter().next())
    }
}

#[async_trait]
impl<D: Datastore> Service for NedbService<D> {
    async fn find(&self, params: Params) -> ServiceResult<Page<Record>> {
        let query = translate(&params.query)?;
        let limit = self.paginate.effective_limit(query.limit);
        let skip = query.skip.unwrap_or(0);

        debug!("find: filter={:?} limit={:?} skip={}", query.filter, limit, skip);

        let options = FindOptions {
            sort: query.sort,
            skip: Some(skip),
            limit,
            projection: self.projection(query.select),
        };

        let (total, data) = if limit == Some(0) {
            (self.model.count(&query.filter).await?, Vec::new())
        } else {
            futures::try_join!(
                self.model.count(&query.filter),
                self.model.find(&query.filter, &options),
            )?
        };

        Ok(Page::builder(data)
            .with_total(total)
            .with_limit(limit)
            .with_skip(skip)
            .build())
    }

    async fn get(&self, id: Id, params: Params) -> ServiceResult<Record> {
        debug!("get: id={id}");

        let query = translate(&params.query)?;
        let filter = self.id_filter(&id).and(query.filter);

        self.find_first(&filter, self.projection(query.select))
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    async fn create(
        &self,
        data: OneOrMany<Record>,
        params: Params,
    ) -> ServiceResult<OneOrMany<Record>> {
        let query = translate(&params.query)?;
        let projection = self.projection(query.select);
        let single = data.is_one();
        let records = data
            .into_vec()
            .into_iter()
            .map(|record| self.with_id(record))
            .collect::<Vec<_>>();

        debug!("create: {} record(s)", records.len());

        let inserted = self
            .model
            .insert(records)
            .await?
            .into_iter()
            .map(|record| self.select(record, projection.as_deref()))
            .collect::<Vec<_>>();

        if single {
            inserted
                .into_iter()
                .next()
                .map(OneOrMany::One)
                .ok_or_else(|| ServiceError::Storage("datastore returned no inserted record".to_string()))
        } else {
            Ok(OneOrMany::Many(inserted))
        }
    }

    async fn update(&self, id: Id, data: Record, params: Params) -> ServiceResult<Record> {
        let query = translate(&params.query)?;
        let projection = self.projection(query.select);
        let mut replacement = self.strip_ids(data);
        replacement.insert(self.id.clone(), id.to_value());

        debug!("update: id={id} upsert={}", params.nedb.upsert);

        // The existence check and the following write are two store calls. A
        // concurrent insert of the same id in between makes the upsert insert fail
        // on the store's unique `_id` constraint.
        let narrowed = !matches!(query.filter, Expr::All);
        let existing = self
            .find_first(&self.id_filter(&id).and(query.filter), None)
            .await?;

        let Some(existing) = existing else {
            if !params.nedb.upsert {
                return Err(ServiceError::NotFound(id));
            }

            // A record the query filtered out still owns the id; it is not upserted over.
            if narrowed && self.find_first(&self.id_filter(&id), None).await?.is_some() {
                return Err(ServiceError::NotFound(id));
            }

            let inserted = self.model.insert(vec![replacement]).await?;

            return inserted
                .into_iter()
                .next()
                .map(|record| self.select(record, projection.as_deref()))
                .ok_or_else(|| ServiceError::Storage("datastore returned no inserted record".to_string()));
        };

        let filter = self.record_filter(&existing, &id);
        self.model.update(&filter, Modifier::Replace(replacement), false).await?;

        self.find_first(&filter, projection)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    async fn patch(
        &self,
        id: Option<Id>,
        data: Record,
        params: Params,
    ) -> ServiceResult<OneOrMany<Record>> {
        let query = translate(&params.query)?;
        let projection = self.projection(query.select);
        let changes = self.strip_ids(data);

        debug!("patch: id={id:?}");

        let (filter, limit) = match &id {
            Some(id) => (self.id_filter(id).and(query.filter), Some(1)),
            None => (query.filter, None),
        };
        let matched = self
            .model
            .find(&filter, &FindOptions { limit, ..FindOptions::default() })
            .await?;

        if let Some(id) = &id {
            if matched.is_empty() {
                return Err(ServiceError::NotFound(id.clone()));
            }
        }

        let keys = matched
            .iter()
            .filter_map(|record| record.get(&self.id).cloned())
            .collect::<Vec<Value>>();
        let by_keys = Expr::field(self.id.as_str(), FieldOp::In, Value::Array(keys.clone()));

        if !keys.is_empty() {
            self.model.update(&by_keys, Modifier::Set(changes), true).await?;
        }

        let updated = if keys.is_empty() {
            Vec::new()
        } else {
            self.model
                .find(&by_keys, &FindOptions { projection, ..FindOptions::default() })
                .await?
        };

        // Keep the order in which records were matched.
        let ordered = keys
            .iter()
            .filter_map(|key| {
                updated
                    .iter()
                    .find(|record| record.get(&self.id) == Some(key))
                    .cloned()
            })
            .collect::<Vec<_>>();

        match id {
            Some(id) => ordered
                .into_iter()
                .next()
                .map(OneOrMany::One)
                .ok_or(ServiceError::NotFound(id)),
            None => Ok(OneOrMany::Many(ordered)),
        }
    }

    async fn remove(&self, id: Option<Id>, params: Params) -> ServiceResult<OneOrMany<Record>> {
        let query = translate(&params.query)?;
        let projection = self.projection(query.select);

        debug!("remove: id={id:?}");

        match id {
            Some(id) => {
                let existing = self
                    .find_first(&self.id_filter(&id).and(query.filter), None)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(id.clone()))?;

                self.model
                    .remove(&self.record_filter(&existing, &id), false)
                    .await?;

                Ok(OneOrMany::One(self.select(existing, projection.as_deref())))
            }
            None => {
                let existing = self
                    .model
                    .find(&query.filter, &FindOptions::default())
                    .await?;

                self.model.remove(&query.filter, true).await?;

                Ok(OneOrMany::Many(
                    existing
                        .into_iter()
                        .map(|record| self.select(record, projection.as_deref()))
                        .collect(),
                ))
            }
        }
    }
}
