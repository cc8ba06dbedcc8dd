//! Query error types
//!
//! Separates specifications that can never compile from failures that happen
//! while running a valid query.

use thiserror::Error;

/// Errors that can occur while validating, compiling or executing a chart query
#[derive(Error, Debug)]
pub enum QueryError {
    /// A structural field is outside its enumerated set
    #[error("Invalid {field}: '{value}' (expected {expected})")]
    InvalidField {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// An event type in the list is the empty string
    #[error("Invalid eventTypes: event type names cannot be empty")]
    EmptyEventType,

    /// The same event type appears twice
    #[error("Invalid eventTypes: '{0}' is listed more than once")]
    DuplicateEventType(String),

    /// Storage layer error while executing
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

impl QueryError {
    pub(crate) fn invalid_field(
        field: &'static str,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
            expected,
        }
    }

    /// True when the specification itself is at fault (as opposed to execution)
    pub fn is_invalid_spec(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
