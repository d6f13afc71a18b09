//! Loading and normalizing a multivariate series with its presence mask.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};

use crate::error::{DataError, Result};
use crate::io::{
    read_meanstd_npz, read_metadata_npy, read_series_npz, MEANSTD_FILE, METADATA_FILE, SERIES_FILE,
};
use crate::registry;

/// A normalized (T, N) series together with everything loaded alongside it.
///
/// Immutable once constructed. Datasets for the three partitions share one
/// source behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SeriesSource {
    /// Normalized series (T, N).
    series: Array2<f32>,
    /// 1 where the value was actually observed (T, N).
    presence_mask: Array2<f32>,
    /// Per-channel mean used for normalization (N).
    mean: Array1<f32>,
    /// Per-channel std used for normalization (N).
    std: Array1<f32>,
    /// Raw categorical metadata codes (T, M), if loaded.
    metadata_codes: Option<Array2<i64>>,
}

impl SeriesSource {
    /// Build a source from raw (unnormalized) arrays.
    ///
    /// The series is normalized per channel as `(x - mean) / std`.
    ///
    /// # Errors
    ///
    /// - [`DataError::ShapeMismatch`] if the mask shape differs from the
    ///   series, or mean/std length differs from the channel count.
    /// - [`DataError::ZeroStd`] if any std entry is zero.
    pub fn from_arrays(
        raw: Array2<f32>,
        presence_mask: Array2<f32>,
        mean: Array1<f32>,
        std: Array1<f32>,
    ) -> Result<Self> {
        if raw.shape() != presence_mask.shape() {
            return Err(DataError::ShapeMismatch(format!(
                "series has shape {:?} but mask has shape {:?}",
                raw.shape(),
                presence_mask.shape()
            )));
        }

        let n_channels = raw.ncols();
        if mean.len() != n_channels || std.len() != n_channels {
            return Err(DataError::ShapeMismatch(format!(
                "series has {} channels but mean/std have {}/{} entries",
                n_channels,
                mean.len(),
                std.len()
            )));
        }

        if let Some(channel) = std.iter().position(|&s| s == 0.0) {
            return Err(DataError::ZeroStd { channel });
        }

        let mut series = raw;
        for (mut column, (&m, &s)) in series
            .axis_iter_mut(Axis(1))
            .zip(mean.iter().zip(std.iter()))
        {
            column.mapv_inplace(|x| (x - m) / s);
        }

        Ok(Self {
            series,
            presence_mask,
            mean,
            std,
            metadata_codes: None,
        })
    }

    /// Attach categorical metadata codes, one row per time step.
    pub fn with_metadata_codes(mut self, codes: Array2<i64>) -> Result<Self> {
        if codes.nrows() != self.len() {
            return Err(DataError::ShapeMismatch(format!(
                "series has {} time steps but metadata has {} rows",
                self.len(),
                codes.nrows()
            )));
        }
        self.metadata_codes = Some(codes);
        Ok(self)
    }

    /// Load a registered dataset from `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Base storage location holding one folder per dataset
    /// * `dataset` - Registered identifier, e.g. `"electricity"`
    /// * `with_metadata` - Also read the categorical metadata matrix
    pub fn load(root: impl AsRef<Path>, dataset: &str, with_metadata: bool) -> Result<Self> {
        let info = registry::resolve(dataset)?;
        let dir = info.dir(root.as_ref());

        let (raw, mask) = read_series_npz(dir.join(SERIES_FILE))?;
        let (mean, std) = read_meanstd_npz(dir.join(MEANSTD_FILE))?;
        let source = Self::from_arrays(raw, mask, mean, std)?;

        tracing::info!(
            dataset,
            time_steps = source.len(),
            channels = source.n_channels(),
            "Loaded series from {:?}",
            dir
        );

        if with_metadata {
            let codes = read_metadata_npy(dir.join(METADATA_FILE))?;
            source.with_metadata_codes(codes)
        } else {
            Ok(source)
        }
    }

    /// Number of time steps T.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.nrows()
    }

    /// Whether the series has no time steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.nrows() == 0
    }

    /// Number of channels N.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.series.ncols()
    }

    /// The normalized series.
    #[must_use]
    pub fn series(&self) -> &Array2<f32> {
        &self.series
    }

    /// The presence mask.
    #[must_use]
    pub fn presence_mask(&self) -> &Array2<f32> {
        &self.presence_mask
    }

    /// Per-channel mean.
    #[must_use]
    pub fn mean(&self) -> &Array1<f32> {
        &self.mean
    }

    /// Per-channel standard deviation.
    #[must_use]
    pub fn std(&self) -> &Array1<f32> {
        &self.std
    }

    /// Raw metadata codes, if loaded.
    #[must_use]
    pub fn metadata_codes(&self) -> Option<&Array2<i64>> {
        self.metadata_codes.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ndarray::array;

    #[test]
    fn test_normalizes_per_channel() {
        let raw = array![[1.0f32, 10.0], [3.0, 30.0]];
        let mask = Array2::ones((2, 2));
        let source =
            SeriesSource::from_arrays(raw, mask, array![2.0, 20.0], array![1.0, 10.0]).unwrap();

        assert_eq!(source.series(), &array![[-1.0f32, -1.0], [1.0, 1.0]]);
        assert_eq!(source.mean(), &array![2.0f32, 20.0]);
        assert_eq!(source.len(), 2);
        assert_eq!(source.n_channels(), 2);
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let err = SeriesSource::from_arrays(
            Array2::zeros((4, 2)),
            Array2::ones((4, 3)),
            Array1::zeros(2),
            Array1::ones(2),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch(_)));
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn test_zero_std_rejected() {
        let err = SeriesSource::from_arrays(
            Array2::zeros((4, 3)),
            Array2::ones((4, 3)),
            Array1::zeros(3),
            array![1.0, 0.0, 2.0],
        )
        .unwrap_err();
        assert!(matches!(err, DataError::ZeroStd { channel: 1 }));
    }

    #[test]
    fn test_metadata_rows_must_match() {
        let source = SeriesSource::from_arrays(
            Array2::zeros((4, 1)),
            Array2::ones((4, 1)),
            Array1::zeros(1),
            Array1::ones(1),
        )
        .unwrap();
        let err = source.with_metadata_codes(Array2::ones((3, 2))).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch(_)));
    }

    #[test]
    fn test_load_unknown_dataset() {
        let err = SeriesSource::load("./data", "solar", false).unwrap_err();
        assert!(matches!(err, DataError::UnknownDataset { .. }));
    }
}
