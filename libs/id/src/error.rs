//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID is longer than allowed.
    #[error("ID too long: {len} > {max}")]
    TooLong { len: usize, max: usize },

    /// The ID contains a character outside the allowed set.
    #[error("invalid character '{ch}' in ID '{id}'")]
    InvalidChar { id: String, ch: char },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
