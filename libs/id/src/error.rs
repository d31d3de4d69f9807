//! Error types for id parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating ids.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The id string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The id exceeds the maximum length.
    #[error("ID too long: {actual} bytes (max {max})")]
    TooLong { max: usize, actual: usize },

    /// The id contains a character outside the accepted set.
    #[error("invalid character {0:?} in ID")]
    InvalidCharacter(char),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
