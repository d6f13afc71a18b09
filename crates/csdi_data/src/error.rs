//! Error types for csdi_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Coarse classification of a [`DataError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is invalid: unknown dataset, bad mode, too many
    /// conditioning features.
    Configuration,
    /// Persisted data is inconsistent or unreadable.
    Data,
    /// An ordinal outside the dataset's window index.
    Index,
}

/// Errors that can occur while loading, indexing or batching windows.
#[derive(Error, Debug)]
pub enum DataError {
    /// Dataset identifier with no registered storage folder.
    #[error("Unknown dataset: '{name}'. Available: {available}")]
    UnknownDataset {
        /// The requested identifier.
        name: String,
        /// Comma-separated registered identifiers.
        available: String,
    },

    /// More conditioning features requested than the series has channels.
    #[error("Cannot select {requested} conditioning features from {available} channels")]
    TooManyConditFeatures {
        /// Requested feature count.
        requested: usize,
        /// Number of channels in the series.
        available: usize,
    },

    /// Invalid construction parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid batch size.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Arrays whose shapes must agree do not.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A channel with zero standard deviation cannot be normalized.
    #[error("Standard deviation is zero for channel {channel}")]
    ZeroStd {
        /// Offending channel.
        channel: usize,
    },

    /// A categorical metadata code outside `1..`.
    #[error("Invalid category code {code} at row {row}, column {column} (codes are 1-indexed)")]
    InvalidCategory {
        /// Row (time step).
        row: usize,
        /// Categorical column.
        column: usize,
        /// The code found.
        code: i64,
    },

    /// Metadata matrix without rows or columns.
    #[error("Metadata matrix is empty")]
    EmptyMetadata,

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// File format error.
    #[error("File format error: {0}")]
    FormatError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] csdi_core::CoreError),
}

impl DataError {
    /// Classify this error as a configuration, data or index error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownDataset { .. }
            | Self::TooManyConditFeatures { .. }
            | Self::InvalidConfig(_)
            | Self::InvalidBatchSize(_)
            | Self::CoreError(_) => ErrorKind::Configuration,
            Self::ShapeMismatch(_)
            | Self::ZeroStd { .. }
            | Self::InvalidCategory { .. }
            | Self::EmptyMetadata
            | Self::FormatError(_)
            | Self::IoError(_) => ErrorKind::Data,
            Self::IndexOutOfBounds { .. } => ErrorKind::Index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = DataError::TooManyConditFeatures {
            requested: 400,
            available: 370,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(DataError::ZeroStd { channel: 3 }.kind(), ErrorKind::Data);
        let err = DataError::IndexOutOfBounds { index: 9, length: 9 };
        assert_eq!(err.kind(), ErrorKind::Index);
        assert_eq!(err.to_string(), "Index 9 out of bounds for length 9");
    }

    #[test]
    fn test_invalid_mode_is_configuration() {
        let err: DataError = csdi_core::CoreError::InvalidMode("dev".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
