//! Error types and result types for service and datastore operations.
//!
//! Three layers of failure exist:
//!
//! - [`ConfigurationError`] is returned synchronously while constructing a service.
//! - [`StoreError`] is what a [`Datastore`](crate::datastore::Datastore) reports.
//! - [`ServiceError`] is what every service call resolves to on failure. Store failures
//!   are wrapped into [`ServiceError::Storage`] with their original message.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::id::Id;

/// Raised while constructing a service from its options.
///
/// The messages are part of the public contract and must not change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No options were supplied at all.
    #[error("options have to be provided")]
    MissingOptions,
    /// Options were supplied without a datastore handle.
    #[error("datastore `Model` needs to be provided")]
    MissingModel,
}

/// Represents all possible errors a service call can resolve to.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service was misconfigured.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// No record exists for the addressed identifier.
    #[error("No record found for id '{0}'")]
    NotFound(Id),
    /// The query or payload could not be understood.
    #[error("{0}")]
    BadRequest(String),
    /// The underlying datastore reported an error. The message is kept verbatim.
    #[error("{0}")]
    Storage(String),
}

impl ServiceError {
    /// Returns `true` for [`ServiceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

/// A specialized `Result` type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors reported by a datastore implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write would duplicate a value under a unique index.
    /// The first argument is the offending key, the second the indexed field.
    #[error("Can't insert key {0}, it violates the unique constraint on field {1}")]
    UniqueViolation(String, String),
    /// A logical operator the store does not understand.
    #[error("Unknown logical operator {0}")]
    UnknownLogicalOperator(String),
    /// A comparison operator the store does not understand.
    #[error("Unknown comparison function {0}")]
    UnknownComparison(String),
    /// An operator was given a value of the wrong shape.
    #[error("Invalid operand for {0}: {1}")]
    InvalidOperand(String, String),
    /// The record is not a JSON object or breaks a store rule.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// Too many lines of the datafile could not be parsed.
    #[error("More than {threshold}% of the data file is corrupt ({corrupt} of {total} lines)")]
    Corrupt {
        /// Number of unreadable lines.
        corrupt: usize,
        /// Total number of non-empty lines.
        total: usize,
        /// Tolerated share, in percent.
        threshold: f64,
    },
    /// Reading or writing the datafile failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A record could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// A specialized `Result` type for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
