//! The embedded datastore.
//!
//! Records live in memory, keyed by `_id` and guarded by an async read-write lock.
//! When a datafile is configured every write is also appended to it, see
//! [`persistence`](crate::persistence).

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use mea::rwlock::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    sync::Arc,
};

use nedb_service_core::{
    datastore::{Datastore, DatastoreBuilder},
    error::{StoreError, StoreResult},
    filter::{Expr, FindOptions, Modifier},
    id::Id,
    record::{Record, project},
};

use crate::{
    evaluator::{RecordMatcher, compare_records, values_equal},
    index::{IndexOptions, PRIMARY_KEY},
    persistence::{Persistence, record_key},
};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// Configuration of an [`EmbeddedStore`].
///
/// Deserializable so it can come straight from an application config file:
///
/// ```ignore
/// let options: DatastoreOptions = serde_json::from_str(r#"{
///     "filename": "db-data/people",
///     "autoload": true,
///     "timestampData": true
/// }"#)?;
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DatastoreOptions {
    /// Path of the datafile. `None` keeps the store in memory.
    pub filename: Option<PathBuf>,
    /// Ignore `filename` and keep the store in memory.
    pub in_memory_only: bool,
    /// Load the datafile while building the store.
    pub autoload: bool,
    /// Maintain `createdAt` and `updatedAt` on every record.
    pub timestamp_data: bool,
    /// Share of unreadable datafile lines tolerated on load, between 0 and 1.
    pub corrupt_alert_threshold: f64,
}

impl Default for DatastoreOptions {
    fn default() -> Self {
        Self {
            filename: None,
            in_memory_only: false,
            autoload: false,
            timestamp_data: false,
            corrupt_alert_threshold: 0.1,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    /// `record_key(_id)` -> record
    records: BTreeMap<String, Record>,
    /// field name -> index definition, excluding the implicit `_id` index
    indexes: BTreeMap<String, IndexOptions>,
}

impl State {
    fn matching_keys(&self, filter: &Expr, multi: bool) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();

        for (key, record) in &self.records {
            if RecordMatcher::new(record).matches(filter)? {
                keys.push(key.clone());
                if !multi {
                    break;
                }
            }
        }

        Ok(keys)
    }

    /// Checks every unique index for `candidates`, ignoring the records stored
    /// under `replaced` (they are about to be overwritten).
    fn check_unique(&self, candidates: &[&Record], replaced: &HashSet<String>) -> StoreResult<()> {
        let existing = || {
            self.records
                .iter()
                .filter(|(key, _)| !replaced.contains(*key))
                .map(|(_, record)| record)
        };

        IndexOptions::new(PRIMARY_KEY)
            .unique(true)
            .check(existing(), candidates)?;

        for index in self.indexes.values() {
            index.check(existing(), candidates)?;
        }

        Ok(())
    }
}

/// Embedded, optionally file-backed JSON document datastore.
///
/// Cloning is cheap; clones share the same records.
///
/// # Ordering
///
/// Records are kept ordered by `_id`. Generated ids are random, so a `find`
/// without sort keys does not return records in insertion order.
///
/// # Example
///
/// ```ignore
/// use nedb_datastore::EmbeddedStore;
///
/// let store = EmbeddedStore::builder()
///     .filename("db-data/people")
///     .autoload(true)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddedStore {
    state: Arc<RwLock<State>>,
    options: DatastoreOptions,
    persistence: Option<Persistence>,
}

impl EmbeddedStore {
    /// Creates an empty store from options without loading the datafile.
    pub fn new(options: DatastoreOptions) -> Self {
        let persistence = match (&options.filename, options.in_memory_only) {
            (Some(path), false) => Some(Persistence::new(path, options.corrupt_alert_threshold)),
            _ => None,
        };

        Self {
            state: Arc::new(RwLock::new(State::default())),
            options,
            persistence,
        }
    }

    /// Creates an empty in-memory store.
    pub fn in_memory() -> Self {
        Self::new(DatastoreOptions::default())
    }

    /// Creates a builder for a store.
    pub fn builder() -> EmbeddedStoreBuilder {
        EmbeddedStoreBuilder::default()
    }

    /// The options this store was created with.
    pub fn options(&self) -> &DatastoreOptions {
        &self.options
    }

    /// Replaces the in-memory state with the datafile's content, then compacts the
    /// datafile. A no-op for in-memory stores.
    pub async fn load_database(&self) -> StoreResult<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let mut state = self.state.write().await;
        let loaded = persistence.load()?;

        let fresh = State {
            records: BTreeMap::new(),
            indexes: loaded.indexes,
        };
        let records = loaded.records.values().collect::<Vec<_>>();
        fresh.check_unique(&records, &HashSet::new())?;

        state.records = loaded.records;
        state.indexes = fresh.indexes;

        persistence.compact(state.records.values(), state.indexes.values())?;
        debug!("loaded datastore {:?}", persistence.path());

        Ok(())
    }

    /// Rewrites the datafile with only the live records and indexes.
    pub async fn compact(&self) -> StoreResult<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let state = self.state.write().await;
        persistence.compact(state.records.values(), state.indexes.values())
    }

    /// Adds an index, or replaces the definition of an existing one.
    ///
    /// Fails without changing anything if current records violate a unique index.
    pub async fn ensure_index(&self, index: IndexOptions) -> StoreResult<()> {
        if index.field_name == PRIMARY_KEY {
            return Ok(());
        }

        let mut state = self.state.write().await;
        index.check([], &state.records.values().collect::<Vec<_>>())?;

        if let Some(persistence) = &self.persistence {
            persistence.append_index_created(&index)?;
        }

        debug!("ensured index on {}", index.field_name);
        state.indexes.insert(index.field_name.clone(), index);

        Ok(())
    }

    /// Removes the index on `field`. Removing a missing index is a no-op.
    pub async fn remove_index(&self, field: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;

        if state.indexes.contains_key(field) {
            if let Some(persistence) = &self.persistence {
                persistence.append_index_removed(field)?;
            }
            state.indexes.remove(field);
        }

        Ok(())
    }

    /// The definitions of all indexes, excluding the implicit `_id` index.
    pub async fn indexes(&self) -> Vec<IndexOptions> {
        self.state.read().await.indexes.values().cloned().collect()
    }

    fn now() -> Value {
        Value::String(Utc::now().to_rfc3339())
    }

    /// Prepares a record for insertion: validates it, assigns `_id` and timestamps.
    fn prepare_insert(&self, mut record: Record) -> StoreResult<(String, Record)> {
        check_field_names(&record)?;

        let id = match record.get(PRIMARY_KEY) {
            Some(id) => id.clone(),
            None => {
                let id = Id::generate().to_value();
                record.insert(PRIMARY_KEY.to_string(), id.clone());
                id
            }
        };

        if self.options.timestamp_data {
            let now = Self::now();
            record.entry(CREATED_AT).or_insert_with(|| now.clone());
            record.insert(UPDATED_AT.to_string(), now);
        }

        Ok((record_key(&id)?, record))
    }

    /// Computes the new state of `current` under `modifier`.
    fn apply_modifier(&self, current: &Record, modifier: &Modifier) -> StoreResult<Record> {
        let mut updated = match modifier {
            Modifier::Replace(replacement) => {
                let mut updated = replacement.clone();

                if let Some(created) = current.get(CREATED_AT).filter(|_| self.options.timestamp_data) {
                    updated.entry(CREATED_AT).or_insert_with(|| created.clone());
                }

                updated
            }
            Modifier::Set(fields) => {
                let mut updated = current.clone();
                for (path, value) in fields {
                    set_path(&mut updated, path, value.clone())?;
                }
                updated
            }
            Modifier::Unset(paths) => {
                let mut updated = current.clone();
                for path in paths {
                    unset_path(&mut updated, path);
                }
                updated
            }
        };

        let current_id = current.get(PRIMARY_KEY).cloned().unwrap_or(Value::Null);
        match updated.get(PRIMARY_KEY) {
            Some(id) if !values_equal(id, &current_id) => {
                return Err(StoreError::InvalidRecord("You cannot change a record's _id".to_string()));
            }
            Some(_) => {}
            None => {
                updated.insert(PRIMARY_KEY.to_string(), current_id);
            }
        }

        check_field_names(&updated)?;

        if self.options.timestamp_data {
            updated.insert(UPDATED_AT.to_string(), Self::now());
        }

        Ok(updated)
    }
}

#[async_trait]
impl Datastore for EmbeddedStore {
    async fn count(&self, filter: &Expr) -> StoreResult<usize> {
        let state = self.state.read().await;

        Ok(RecordMatcher::filter_records(state.records.values(), filter)?.len())
    }

    async fn find(&self, filter: &Expr, options: &FindOptions) -> StoreResult<Vec<Record>> {
        let state = self.state.read().await;
        let mut matched = RecordMatcher::filter_records(state.records.values(), filter)?;

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| compare_records(a, b, &options.sort));
        }

        Ok(matched
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|record| match &options.projection {
                Some(fields) => project(record, fields),
                None => record.clone(),
            })
            .collect())
    }

    async fn insert(&self, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        let prepared = records
            .into_iter()
            .map(|record| self.prepare_insert(record))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut state = self.state.write().await;
        let candidates = prepared.iter().map(|(_, record)| record).collect::<Vec<_>>();
        state.check_unique(&candidates, &HashSet::new())?;

        if let Some(persistence) = &self.persistence {
            persistence.append_records(candidates.iter().copied())?;
        }

        debug!("inserted {} record(s)", prepared.len());

        let mut inserted = Vec::with_capacity(prepared.len());
        for (key, record) in prepared {
            inserted.push(record.clone());
            state.records.insert(key, record);
        }

        Ok(inserted)
    }

    async fn update(&self, filter: &Expr, modifier: Modifier, multi: bool) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let keys = state.matching_keys(filter, multi)?;

        let updated = keys
            .iter()
            .map(|key| self.apply_modifier(&state.records[key], &modifier))
            .collect::<StoreResult<Vec<_>>>()?;

        let replaced = keys.iter().cloned().collect::<HashSet<_>>();
        state.check_unique(&updated.iter().collect::<Vec<_>>(), &replaced)?;

        if let Some(persistence) = &self.persistence {
            persistence.append_records(updated.iter())?;
        }

        debug!("updated {} record(s)", keys.len());

        for (key, record) in keys.iter().zip(updated) {
            state.records.insert(key.clone(), record);
        }

        Ok(keys.len())
    }

    async fn remove(&self, filter: &Expr, multi: bool) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let keys = state.matching_keys(filter, multi)?;

        // The datafile is written first so a failed append leaves memory untouched.
        if let Some(persistence) = &self.persistence {
            persistence.append_deleted(
                keys.iter()
                    .filter_map(|key| state.records.get(key))
                    .filter_map(|record| record.get(PRIMARY_KEY)),
            )?;
        }

        for key in &keys {
            state.records.remove(key);
        }

        debug!("removed {} record(s)", keys.len());

        Ok(keys.len())
    }
}

/// Field names may not start with `$` or contain `.`, at any depth.
fn check_field_names(record: &Map<String, Value>) -> StoreResult<()> {
    for (key, value) in record {
        if key.starts_with('$') {
            return Err(StoreError::InvalidRecord(format!("Field names cannot begin with the $ character: {key}")));
        }
        if key.contains('.') {
            return Err(StoreError::InvalidRecord(format!("Field names cannot contain a .: {key}")));
        }

        match value {
            Value::Object(nested) => check_field_names(nested)?,
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(nested) = item {
                        check_field_names(nested)?;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Sets a dotted path, creating intermediate objects.
fn set_path(record: &mut Record, path: &str, value: Value) -> StoreResult<()> {
    let mut segments = path.split('.').peekable();
    let mut target = record;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            target.insert(segment.to_string(), value);
            return Ok(());
        }

        let entry = target
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));

        target = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(StoreError::InvalidRecord(format!(
                    "cannot set {path}: {segment} is not an object"
                )));
            }
        };
    }

    Ok(())
}

/// Removes a dotted path if present.
fn unset_path(record: &mut Record, path: &str) {
    match path.split_once('.') {
        Some((head, rest)) => {
            if let Some(Value::Object(nested)) = record.get_mut(head) {
                unset_path(nested, rest);
            }
        }
        None => {
            record.remove(path);
        }
    }
}

/// Builder for [`EmbeddedStore`].
///
/// ```ignore
/// use nedb_datastore::EmbeddedStore;
/// use nedb_service_core::datastore::DatastoreBuilder;
///
/// let store = EmbeddedStore::builder()
///     .filename("db-data/people")
///     .timestamp_data(true)
///     .autoload(true)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmbeddedStoreBuilder {
    options: DatastoreOptions,
}

impl EmbeddedStoreBuilder {
    /// Starts from existing options.
    pub fn from_options(options: DatastoreOptions) -> Self {
        Self { options }
    }

    /// Sets the datafile path.
    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.options.filename = Some(filename.into());
        self
    }

    /// Keeps the store in memory even if a filename is set.
    pub fn in_memory_only(mut self, in_memory_only: bool) -> Self {
        self.options.in_memory_only = in_memory_only;
        self
    }

    /// Loads the datafile while building.
    pub fn autoload(mut self, autoload: bool) -> Self {
        self.options.autoload = autoload;
        self
    }

    /// Maintains `createdAt` / `updatedAt`.
    pub fn timestamp_data(mut self, timestamp_data: bool) -> Self {
        self.options.timestamp_data = timestamp_data;
        self
    }

    /// Sets the tolerated share of corrupt datafile lines.
    pub fn corrupt_alert_threshold(mut self, threshold: f64) -> Self {
        self.options.corrupt_alert_threshold = threshold;
        self
    }
}

#[async_trait]
impl DatastoreBuilder for EmbeddedStoreBuilder {
    type Datastore = EmbeddedStore;

    async fn build(self) -> StoreResult<Self::Datastore> {
        let autoload = self.options.autoload;
        let store = EmbeddedStore::new(self.options);

        if autoload {
            store.load_database().await?;
        }

        Ok(store)
    }
}
