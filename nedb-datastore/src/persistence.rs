//! Append-only datafile persistence.
//!
//! The datafile holds one JSON object per line. Every write appends the new state
//! of each touched record; removals append a tombstone and index changes append a
//! marker line:
//!
//! ```text
//! {"_id":"5f1c...","name":"Alice","age":30}
//! {"$$deleted":true,"_id":"5f1c..."}
//! {"$$indexCreated":{"fieldName":"email","unique":true,"sparse":false}}
//! {"$$indexRemoved":"email"}
//! ```
//!
//! Loading replays the file top to bottom, so the last line for an `_id` wins.
//! Compaction rewrites the file with only the live state, through a temporary
//! file that atomically replaces the original.

use fs2::FileExt;
use log::{debug, error, warn};
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use nedb_service_core::{
    error::{StoreError, StoreResult},
    record::Record,
};

use crate::index::{IndexOptions, PRIMARY_KEY, canonical_key};

const DELETED: &str = "$$deleted";
const INDEX_CREATED: &str = "$$indexCreated";
const INDEX_REMOVED: &str = "$$indexRemoved";

/// State recovered from a datafile.
#[derive(Debug, Default)]
pub(crate) struct Loaded {
    pub records: BTreeMap<String, Record>,
    pub indexes: BTreeMap<String, IndexOptions>,
}

/// Reads and writes one datafile.
#[derive(Debug, Clone)]
pub(crate) struct Persistence {
    path: PathBuf,
    corrupt_alert_threshold: f64,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>, corrupt_alert_threshold: f64) -> Self {
        Self {
            path: path.into(),
            corrupt_alert_threshold,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replays the datafile. A missing file (and its parent directories) is created.
    pub fn load(&self) -> StoreResult<Loaded> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            File::create(&self.path)?;
            debug!("created datafile {:?}", self.path);

            return Ok(Loaded::default());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let mut loaded = Loaded::default();
        let mut total = 0usize;
        let mut corrupt = 0usize;

        for line in BufReader::new(&file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            total += 1;

            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(entry)) => {
                    if !Self::replay(&mut loaded, entry) {
                        corrupt += 1;
                    }
                }
                _ => corrupt += 1,
            }
        }

        FileExt::unlock(&file)?;

        if corrupt > 0 {
            warn!("skipped {corrupt} of {total} datafile lines in {:?}", self.path);
        }

        if total > 0 && (corrupt as f64 / total as f64) > self.corrupt_alert_threshold {
            error!("datafile {:?} is corrupt beyond the tolerated threshold", self.path);

            return Err(StoreError::Corrupt {
                corrupt,
                total,
                threshold: self.corrupt_alert_threshold * 100.0,
            });
        }

        debug!(
            "loaded {} record(s) and {} index(es) from {:?}",
            loaded.records.len(),
            loaded.indexes.len(),
            self.path
        );

        Ok(loaded)
    }

    /// Applies one datafile line. Returns `false` for lines that make no sense.
    fn replay(loaded: &mut Loaded, entry: Record) -> bool {
        if let Some(index) = entry.get(INDEX_CREATED) {
            return match serde_json::from_value::<IndexOptions>(index.clone()) {
                Ok(index) => {
                    loaded.indexes.insert(index.field_name.clone(), index);
                    true
                }
                Err(_) => false,
            };
        }

        if let Some(field) = entry.get(INDEX_REMOVED) {
            return match field.as_str() {
                Some(field) => {
                    loaded.indexes.remove(field);
                    true
                }
                None => false,
            };
        }

        let Some(key) = entry.get(PRIMARY_KEY).and_then(|id| record_key(id).ok()) else {
            return false;
        };

        if entry.get(DELETED).is_some_and(|flag| flag == &Value::Bool(true)) {
            loaded.records.remove(&key);
        } else {
            loaded.records.insert(key, entry);
        }

        true
    }

    fn append_lines(&self, lines: impl IntoIterator<Item = Value>) -> StoreResult<()> {
        let mut buffer = String::new();
        for line in lines {
            buffer.push_str(&serde_json::to_string(&line)?);
            buffer.push('\n');
        }

        if buffer.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        FileExt::unlock(&file)?;

        Ok(())
    }

    /// Appends the current state of the given records.
    pub fn append_records<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> StoreResult<()> {
        self.append_lines(records.into_iter().map(|record| Value::Object(record.clone())))
    }

    /// Appends tombstones for the given primary key values.
    pub fn append_deleted<'a>(&self, ids: impl IntoIterator<Item = &'a Value>) -> StoreResult<()> {
        self.append_lines(ids.into_iter().map(|id| json!({ DELETED: true, PRIMARY_KEY: id })))
    }

    pub fn append_index_created(&self, index: &IndexOptions) -> StoreResult<()> {
        self.append_lines([json!({ INDEX_CREATED: index })])
    }

    pub fn append_index_removed(&self, field: &str) -> StoreResult<()> {
        self.append_lines([json!({ INDEX_REMOVED: field })])
    }

    /// Rewrites the datafile with only the given live state.
    pub fn compact<'a>(
        &self,
        records: impl IntoIterator<Item = &'a Record>,
        indexes: impl IntoIterator<Item = &'a IndexOptions>,
    ) -> StoreResult<()> {
        let mut buffer = String::new();

        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }
        for index in indexes {
            buffer.push_str(&serde_json::to_string(&json!({ INDEX_CREATED: index }))?);
            buffer.push('\n');
        }

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push("~");
        let tmp_path = PathBuf::from(tmp_path);

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .inspect_err(|_| error!("failed to open temp path {tmp_path:?}"))?;

        tmp_file.lock_exclusive()?;
        tmp_file.write_all(buffer.as_bytes())?;
        tmp_file.sync_all()?;
        FileExt::unlock(&tmp_file)?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        debug!("compacted datafile {:?}", self.path);

        Ok(())
    }
}

/// The map key under which a record with primary key `id` is stored.
///
/// String keys are used as-is, so the default ordering of records is the
/// lexicographic order of their `_id`s. Numbers are keyed by value (`1` and `1.0`
/// are the same record) behind a prefix that keeps them apart from strings.
pub(crate) fn record_key(id: &Value) -> StoreResult<String> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) => Ok(format!("#{}", canonical_key(id))),
        other => Err(StoreError::InvalidRecord(format!(
            "{PRIMARY_KEY} must be a string or a number, got {other}"
        ))),
    }
}
