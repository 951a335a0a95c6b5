//! Error types for the Lattice Data core.

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// The main error type for core data operations.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Property-related error.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// Conversion-related error.
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// List-related error.
    #[error("List error: {0}")]
    List(#[from] ListError),
}

/// Errors raised when reading or writing a member of a data object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The object has no member with this name.
    #[error("'{type_name}' has no property '{name}'")]
    NotFound { type_name: String, name: String },

    /// The member exists but cannot be written.
    #[error("Property '{name}' is read-only")]
    ReadOnly { name: String },

    /// The value does not fit the member.
    #[error("Type mismatch for property '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl PropertyError {
    /// Create a not-found error.
    pub fn not_found(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Create a read-only error.
    pub fn read_only(name: impl Into<String>) -> Self {
        Self::ReadOnly { name: name.into() }
    }
}

/// A value converter could not convert a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot convert {value} to {target}: {message}")]
pub struct ConversionError {
    /// Debug rendering of the offending value.
    pub value: String,
    /// Name of the requested target representation.
    pub target: String,
    /// Reason reported by the converter.
    pub message: String,
}

impl ConversionError {
    /// Create a conversion error.
    pub fn new(
        value: impl std::fmt::Debug,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            value: format!("{value:?}"),
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by [`ObservableList`](crate::ObservableList) mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    /// An index was outside the list bounds.
    #[error("Index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The list has a fixed size and cannot grow or shrink.
    #[error("The list has a fixed size")]
    FixedSize,

    /// The list is read-only.
    #[error("The list is read-only")]
    ReadOnly,

    /// The list has no item factory to create new items.
    #[error("The list cannot create new items")]
    NoItemFactory,
}
