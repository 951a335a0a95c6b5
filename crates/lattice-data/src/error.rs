//! Error types for collection views and property paths.

use lattice_data_core::{ListError, PropertyError};

/// Result type alias for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Errors raised by collection views.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// The operation is not allowed in the view's current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The view or its source does not support the operation.
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// A cursor position was outside `-1..=count`.
    #[error("Position {position} is out of range for a view of {count} items")]
    PositionOutOfRange { position: isize, count: usize },

    /// An index was outside the view.
    #[error("Index {index} is out of range for a view of {count} items")]
    IndexOutOfRange { index: usize, count: usize },

    /// The source list rejected a mutation.
    #[error("Source list error: {0}")]
    List(#[from] ListError),

    /// A sort or group description carries a malformed property path.
    #[error("Path error: {0}")]
    Path(#[from] PathError),
}

impl ViewError {
    /// Create an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

/// Errors raised by property paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The path text is malformed.
    #[error("Invalid property path '{path}' at {position}: {message}")]
    Parse {
        path: String,
        position: usize,
        message: String,
    },

    /// A write was attempted through a path that does not currently resolve.
    #[error("Property path '{0}' is broken")]
    Broken(String),

    /// The last step rejected the write.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// The last step is a list index and the list rejected the write.
    #[error("List error: {0}")]
    List(#[from] ListError),
}

impl PathError {
    /// Create a parse error.
    pub fn parse(path: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            position,
            message: message.into(),
        }
    }
}
