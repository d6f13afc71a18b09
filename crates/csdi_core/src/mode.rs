//! Partition modes for windowed datasets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which partition of a series a dataset draws its windows from.
///
/// Train uses every window start. Valid and test sample one window per
/// periodic block, at different offsets inside the block.
///
/// # Example
///
/// ```rust
/// use csdi_core::Mode;
///
/// assert!(Mode::Train.is_train());
/// assert!(Mode::Test.is_eval());
/// assert_eq!(Mode::Valid.to_string(), "valid");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// All valid window starts.
    #[default]
    Train,
    /// One window per block, offset by one prediction length.
    Valid,
    /// One window per block, offset by two prediction lengths.
    Test,
}

impl Mode {
    /// All modes in partition order.
    pub const ALL: [Mode; 3] = [Mode::Train, Mode::Valid, Mode::Test];

    /// Check if this is the training partition.
    #[must_use]
    pub const fn is_train(&self) -> bool {
        matches!(self, Mode::Train)
    }

    /// Check if this is an evaluation partition (valid or test).
    #[must_use]
    pub const fn is_eval(&self) -> bool {
        matches!(self, Mode::Valid | Mode::Test)
    }

    /// Whether loaders over this partition shuffle by default.
    #[must_use]
    pub const fn shuffles(&self) -> bool {
        self.is_train()
    }

    /// Lowercase name used in config files and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Valid => "valid",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "train" => Ok(Mode::Train),
            "valid" | "validation" => Ok(Mode::Valid),
            "test" => Ok(Mode::Test),
            _ => Err(CoreError::InvalidMode(s.to_string())),
        }
    }
}
