//! Registered datasets and where they live under the data root.

use std::path::{Path, PathBuf};

use crate::error::{DataError, Result};

/// A dataset that can be loaded by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetInfo {
    /// Identifier used on the command line and in configs.
    pub name: &'static str,
    /// Folder name under the data root.
    pub folder: &'static str,
    /// Number of channels (the model's target dimension).
    pub n_channels: usize,
    /// Sampling frequency of the series.
    pub frequency: &'static str,
}

impl DatasetInfo {
    /// Folder holding this dataset's artifacts under `root`.
    #[must_use]
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.folder)
    }
}

/// Datasets with a known storage layout.
pub const DATASETS: &[DatasetInfo] = &[DatasetInfo {
    name: "electricity",
    folder: "electricity_nips",
    n_channels: 370,
    frequency: "hourly",
}];

/// Iterate over registered dataset identifiers.
pub fn list_datasets() -> impl Iterator<Item = &'static str> {
    DATASETS.iter().map(|d| d.name)
}

/// Look up a dataset by identifier.
#[must_use]
pub fn get_dataset_info(name: &str) -> Option<&'static DatasetInfo> {
    DATASETS.iter().find(|d| d.name == name)
}

/// Look up a dataset, failing with [`DataError::UnknownDataset`].
pub fn resolve(name: &str) -> Result<&'static DatasetInfo> {
    get_dataset_info(name).ok_or_else(|| DataError::UnknownDataset {
        name: name.to_string(),
        available: list_datasets().collect::<Vec<_>>().join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_electricity_registered() {
        let info = resolve("electricity").unwrap();
        assert_eq!(info.n_channels, 370);
        assert_eq!(
            info.dir(Path::new("./data")),
            PathBuf::from("./data/electricity_nips")
        );
        assert!(list_datasets().any(|n| n == "electricity"));
    }

    #[test]
    fn test_unknown_dataset() {
        let err = resolve("traffic").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("electricity"));
    }
}
