//! Windowed forecasting dataset over a multivariate series.

use std::path::Path;
use std::sync::Arc;

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

use csdi_core::{Mode, Seed};

use crate::conditioning::Conditioning;
use crate::error::{DataError, Result};
use crate::metadata::one_hot_encode;
use crate::source::SeriesSource;
use crate::windows::build_use_index;

/// Default number of history steps per window (one week of hourly data).
pub const DEFAULT_HISTORY_LENGTH: usize = 168;
/// Default number of steps to forecast.
pub const DEFAULT_PREDICTION_LENGTH: usize = 24;

/// Parameters shared by the train/valid/test datasets of one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastingConfig {
    /// Registered dataset identifier.
    pub dataset: String,
    /// Attach one-hot metadata to every window.
    pub time_weaver: bool,
    /// Drop the history segment entirely.
    pub true_unconditional: bool,
    /// History steps per window, ignored when `true_unconditional`.
    pub history_length: usize,
    /// Steps to forecast.
    pub prediction_length: usize,
    /// Number of randomly chosen conditioning channels; `<= 0` keeps all.
    pub n_condit_features: i64,
    /// Seed for the conditioning channel draw.
    pub seed: Seed,
}

impl Default for ForecastingConfig {
    fn default() -> Self {
        Self {
            dataset: "electricity".to_string(),
            time_weaver: false,
            true_unconditional: false,
            history_length: DEFAULT_HISTORY_LENGTH,
            prediction_length: DEFAULT_PREDICTION_LENGTH,
            n_condit_features: -1,
            seed: Seed::default(),
        }
    }
}

impl ForecastingConfig {
    /// Config for a registered dataset with default window sizes.
    #[must_use]
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Default::default()
        }
    }

    /// Enable or disable metadata.
    #[must_use]
    pub fn with_time_weaver(mut self, enabled: bool) -> Self {
        self.time_weaver = enabled;
        self
    }

    /// Force a zero-length history.
    #[must_use]
    pub fn with_true_unconditional(mut self, enabled: bool) -> Self {
        self.true_unconditional = enabled;
        self
    }

    /// Set the history length.
    #[must_use]
    pub fn with_history_length(mut self, history_length: usize) -> Self {
        self.history_length = history_length;
        self
    }

    /// Set the prediction length.
    #[must_use]
    pub fn with_prediction_length(mut self, prediction_length: usize) -> Self {
        self.prediction_length = prediction_length;
        self
    }

    /// Set the number of conditioning channels.
    #[must_use]
    pub fn with_n_condit_features(mut self, n: i64) -> Self {
        self.n_condit_features = n;
        self
    }

    /// Set the seed for the conditioning draw.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// History length actually used.
    #[must_use]
    pub fn effective_history_length(&self) -> usize {
        if self.true_unconditional {
            0
        } else {
            self.history_length
        }
    }

    /// Window length W = history + prediction.
    #[must_use]
    pub fn window_length(&self) -> usize {
        self.effective_history_length() + self.prediction_length
    }
}

/// Everything the model needs for one window.
///
/// All arrays are owned copies; mutating a record never affects the dataset
/// or other records.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    /// Normalized values (W, N).
    pub observed_data: Array2<f32>,
    /// Conditioning mask for history rows, presence mask for prediction rows (W, N).
    pub observed_mask: Array2<f32>,
    /// Conditioning mask with the prediction rows zeroed (W, N).
    pub gt_mask: Array2<f32>,
    /// Relative time `0..W` (W).
    pub timepoints: Array1<f32>,
    /// Channel ids `0..N` (N).
    pub feature_id: Array1<f32>,
    /// One-hot metadata rows (W, K) when metadata is enabled.
    pub metadata: Option<Array2<f32>>,
    /// Conditioning channels when a subset was drawn.
    pub condit_features: Option<Vec<usize>>,
}

/// A partition of a series cut into history + prediction windows.
///
/// Construction fixes the conditioning draw, the metadata encoding and the
/// window-start index; [`get`](Self::get) only reads them, so a dataset can
/// be shared across threads.
///
/// # Example
///
/// ```rust,ignore
/// use csdi_core::Mode;
/// use csdi_data::{ForecastingConfig, ForecastingDataset};
///
/// let config = ForecastingConfig::new("electricity").with_n_condit_features(5);
/// let valid = ForecastingDataset::load("./data", Mode::Valid, &config)?;
/// let record = valid.get(0)?;
/// assert_eq!(record.observed_data.nrows(), 192);
/// ```
#[derive(Debug, Clone)]
pub struct ForecastingDataset {
    source: Arc<SeriesSource>,
    mode: Mode,
    history_length: usize,
    prediction_length: usize,
    conditioning: Conditioning,
    metadata: Option<Array2<f32>>,
    use_index: Vec<usize>,
}

impl ForecastingDataset {
    /// Load the registered dataset under `root` and build one partition.
    pub fn load(root: impl AsRef<Path>, mode: Mode, config: &ForecastingConfig) -> Result<Self> {
        let source = SeriesSource::load(root, &config.dataset, config.time_weaver)?;
        Self::from_source(Arc::new(source), mode, config)
    }

    /// Build one partition over an already loaded source.
    ///
    /// The conditioning draw uses `config.seed` derived by `mode`, so train,
    /// valid and test each draw their channels independently and a given
    /// (seed, mode) pair always draws the same ones.
    ///
    /// # Errors
    ///
    /// - [`DataError::TooManyConditFeatures`] if `n_condit_features`
    ///   exceeds the channel count.
    /// - [`DataError::InvalidConfig`] if metadata is requested but the
    ///   source has none.
    /// - Metadata encoding errors.
    pub fn from_source(
        source: Arc<SeriesSource>,
        mode: Mode,
        config: &ForecastingConfig,
    ) -> Result<Self> {
        let history_length = config.effective_history_length();
        let prediction_length = config.prediction_length;
        let window_length = history_length + prediction_length;

        // each partition draws its own channels from a stream keyed by mode
        let mut rng = config.seed.derive(mode.as_str()).to_rng();
        let conditioning =
            Conditioning::select(source.presence_mask(), config.n_condit_features, &mut rng)?;

        let metadata = if config.time_weaver {
            let codes = source.metadata_codes().ok_or_else(|| {
                DataError::InvalidConfig(
                    "time_weaver is enabled but the source has no metadata".to_string(),
                )
            })?;
            Some(one_hot_encode(codes.view())?)
        } else {
            None
        };

        let use_index = build_use_index(mode, source.len(), window_length, prediction_length);

        tracing::info!(
            %mode,
            windows = use_index.len(),
            window_length,
            channels = source.n_channels(),
            "Built forecasting dataset"
        );

        Ok(Self {
            source,
            mode,
            history_length,
            prediction_length,
            conditioning,
            metadata,
            use_index,
        })
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.use_index.len()
    }

    /// Whether the partition has no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.use_index.is_empty()
    }

    /// Materialize the window at `ordinal`.
    ///
    /// History rows of both masks come from the conditioning mask. In the
    /// prediction rows `gt_mask` is zero and `observed_mask` is the presence
    /// mask, so every truly observed future value can be scored.
    pub fn get(&self, ordinal: usize) -> Result<WindowRecord> {
        let start = *self
            .use_index
            .get(ordinal)
            .ok_or(DataError::IndexOutOfBounds {
                index: ordinal,
                length: self.len(),
            })?;
        let end = start + self.window_length();
        let pred_start = end - self.prediction_length;

        let observed_data = self.source.series().slice(s![start..end, ..]).to_owned();

        let cond_window = self.conditioning.mask().slice(s![start..end, ..]);
        let mut gt_mask = cond_window.to_owned();
        gt_mask.slice_mut(s![self.history_length.., ..]).fill(0.0);

        let mut observed_mask = cond_window.to_owned();
        observed_mask
            .slice_mut(s![self.history_length.., ..])
            .assign(&self.source.presence_mask().slice(s![pred_start..end, ..]));

        Ok(WindowRecord {
            observed_data,
            observed_mask,
            gt_mask,
            timepoints: Array1::from_shape_fn(self.window_length(), |t| t as f32),
            feature_id: Array1::from_shape_fn(self.n_channels(), |c| c as f32),
            metadata: self
                .metadata
                .as_ref()
                .map(|m| m.slice(s![start..end, ..]).to_owned()),
            condit_features: self.conditioning.features().map(<[usize]>::to_vec),
        })
    }

    /// Iterate over all records in index order.
    pub fn iter(&self) -> impl Iterator<Item = Result<WindowRecord>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Partition this dataset draws from.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// History steps per window.
    #[must_use]
    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Prediction steps per window.
    #[must_use]
    pub fn prediction_length(&self) -> usize {
        self.prediction_length
    }

    /// Window length W.
    #[must_use]
    pub fn window_length(&self) -> usize {
        self.history_length + self.prediction_length
    }

    /// Number of channels N.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.source.n_channels()
    }

    /// Window start offsets, in ordinal order.
    #[must_use]
    pub fn use_index(&self) -> &[usize] {
        &self.use_index
    }

    /// The shared source.
    #[must_use]
    pub fn source(&self) -> &Arc<SeriesSource> {
        &self.source
    }

    /// Conditioning mask over the whole series.
    #[must_use]
    pub fn conditioning_mask(&self) -> &Array2<f32> {
        self.conditioning.mask()
    }

    /// Conditioning channels, when a subset was drawn.
    #[must_use]
    pub fn condit_features(&self) -> Option<&[usize]> {
        self.conditioning.features()
    }

    /// One-hot metadata over the whole series, when enabled.
    #[must_use]
    pub fn metadata(&self) -> Option<&Array2<f32>> {
        self.metadata.as_ref()
    }

    /// Width of the one-hot metadata, when enabled.
    #[must_use]
    pub fn metadata_width(&self) -> Option<usize> {
        self.metadata.as_ref().map(Array2::ncols)
    }

    /// Per-channel mean for de-normalization.
    #[must_use]
    pub fn mean(&self) -> &Array1<f32> {
        self.source.mean()
    }

    /// Per-channel std for de-normalization.
    #[must_use]
    pub fn std(&self) -> &Array1<f32> {
        self.source.std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_source(t: usize, n: usize) -> Arc<SeriesSource> {
        let raw = Array2::from_shape_fn((t, n), |(i, j)| (i * n + j) as f32);
        // channel 0 loses every fifth step
        let mask = Array2::from_shape_fn((t, n), |(i, j)| {
            if j == 0 && i % 5 == 0 {
                0.0
            } else {
                1.0
            }
        });
        let source = SeriesSource::from_arrays(raw, mask, Array1::zeros(n), Array1::ones(n))
            .unwrap()
            .with_metadata_codes(Array2::from_shape_fn((t, 2), |(i, j)| {
                (i % (j + 2)) as i64 + 1
            }))
            .unwrap();
        Arc::new(source)
    }

    fn small_config() -> ForecastingConfig {
        ForecastingConfig::new("synthetic")
            .with_history_length(6)
            .with_prediction_length(2)
    }

    #[test]
    fn test_config_defaults() {
        let config = ForecastingConfig::default();
        assert_eq!(config.window_length(), 192);
        assert_eq!(config.clone().with_true_unconditional(true).window_length(), 24);
    }

    #[test]
    fn test_record_shapes() {
        let ds = ForecastingDataset::from_source(create_source(40, 3), Mode::Train, &small_config())
            .unwrap();
        assert_eq!(ds.len(), 32);

        let record = ds.get(0).unwrap();
        assert_eq!(record.observed_data.dim(), (8, 3));
        assert_eq!(record.observed_mask.dim(), (8, 3));
        assert_eq!(record.gt_mask.dim(), (8, 3));
        assert_eq!(record.timepoints, Array1::from_vec((0..8).map(|t| t as f32).collect()));
        assert_eq!(record.feature_id, array![0.0f32, 1.0, 2.0]);
        assert!(record.metadata.is_none());
        assert!(record.condit_features.is_none());
    }

    #[test]
    fn test_observed_data_is_window_slice() {
        let source = create_source(40, 3);
        let ds =
            ForecastingDataset::from_source(source.clone(), Mode::Train, &small_config()).unwrap();
        let record = ds.get(5).unwrap();
        assert_eq!(record.observed_data, source.series().slice(s![5..13, ..]));
    }

    #[test]
    fn test_masks_in_prediction_rows() {
        let source = create_source(40, 3);
        let config = small_config().with_n_condit_features(1).with_seed(Seed::new(4));
        let ds = ForecastingDataset::from_source(source.clone(), Mode::Train, &config).unwrap();

        for ordinal in 0..ds.len() {
            let start = ds.use_index()[ordinal];
            let record = ds.get(ordinal).unwrap();
            assert!(record.gt_mask.slice(s![6.., ..]).iter().all(|&v| v == 0.0));
            assert_eq!(
                record.observed_mask.slice(s![6.., ..]),
                source.presence_mask().slice(s![start + 6..start + 8, ..])
            );
            assert_eq!(
                record.observed_mask.slice(s![..6, ..]),
                ds.conditioning_mask().slice(s![start..start + 6, ..])
            );
            assert_eq!(record.gt_mask.slice(s![..6, ..]), record.observed_mask.slice(s![..6, ..]));
        }
    }

    #[test]
    fn test_condit_features_attached() {
        let config = small_config().with_n_condit_features(2);
        let ds =
            ForecastingDataset::from_source(create_source(40, 5), Mode::Valid, &config).unwrap();
        let expected = ds.condit_features().unwrap().to_vec();
        for record in ds.iter() {
            assert_eq!(record.unwrap().condit_features.as_deref(), Some(expected.as_slice()));
        }
    }

    #[test]
    fn test_metadata_slice() {
        let config = small_config().with_time_weaver(true);
        let ds =
            ForecastingDataset::from_source(create_source(40, 3), Mode::Train, &config).unwrap();
        // cardinalities 2 and 3
        assert_eq!(ds.metadata_width(), Some(5));
        let record = ds.get(3).unwrap();
        let metadata = record.metadata.unwrap();
        assert_eq!(metadata.dim(), (8, 5));
        assert_eq!(metadata, ds.metadata().unwrap().slice(s![3..11, ..]));
    }

    #[test]
    fn test_metadata_requires_codes() {
        let source = SeriesSource::from_arrays(
            Array2::zeros((40, 2)),
            Array2::ones((40, 2)),
            Array1::zeros(2),
            Array1::ones(2),
        )
        .unwrap();
        let config = small_config().with_time_weaver(true);
        let err =
            ForecastingDataset::from_source(Arc::new(source), Mode::Train, &config).unwrap_err();
        assert!(matches!(err, DataError::InvalidConfig(_)));
    }

    #[test]
    fn test_true_unconditional_window() {
        let config = small_config().with_true_unconditional(true);
        let ds =
            ForecastingDataset::from_source(create_source(40, 3), Mode::Train, &config).unwrap();
        assert_eq!(ds.history_length(), 0);
        assert_eq!(ds.len(), 38);
        let record = ds.get(0).unwrap();
        assert!(record.gt_mask.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_out_of_range() {
        let ds = ForecastingDataset::from_source(create_source(40, 3), Mode::Train, &small_config())
            .unwrap();
        let err = ds.get(32).unwrap_err();
        assert!(matches!(err, DataError::IndexOutOfBounds { index: 32, length: 32 }));
    }

    #[test]
    fn test_repeated_get_identical() {
        let config = small_config().with_n_condit_features(2).with_time_weaver(true);
        let ds =
            ForecastingDataset::from_source(create_source(40, 4), Mode::Train, &config).unwrap();
        let mut first = ds.get(7).unwrap();
        let second = ds.get(7).unwrap();
        assert_eq!(first, second);

        // records do not alias the dataset
        first.observed_data.fill(99.0);
        first.gt_mask.fill(1.0);
        assert_eq!(ds.get(7).unwrap(), second);
    }

    #[test]
    fn test_dataset_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ForecastingDataset>();
    }
}
