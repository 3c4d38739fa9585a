//! Error types for master-facing data.

use hdfs_mesos_id::IdError;
use thiserror::Error;

/// Errors that can occur when parsing master-facing data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A `key:value` pair could not be split.
    #[error("invalid descriptor entry: {0}")]
    InvalidEntry(String),

    /// The descriptor contains a key the type does not know.
    #[error("unsupported key '{key}' in {kind} descriptor")]
    UnsupportedKey { kind: &'static str, key: String },

    /// A required key is missing.
    #[error("missing '{0}' in descriptor")]
    MissingField(&'static str),

    /// A scalar resource value is not a number.
    #[error("invalid value for resource '{name}': {value}")]
    InvalidResource { name: String, value: String },

    /// A port range is malformed.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// An identifier failed validation.
    #[error("invalid id: {0}")]
    InvalidId(#[from] IdError),
}
