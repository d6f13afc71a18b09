//! Error types for csdi_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by csdi_core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A partition mode string that is not one of train/valid/test.
    #[error("Invalid mode: '{0}' (expected one of: train, valid, test)")]
    InvalidMode(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
