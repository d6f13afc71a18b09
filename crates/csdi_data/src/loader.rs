//! Batched iteration over forecasting windows.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use ndarray::{Array, Array1, Array2, Array3, ArrayView, Axis, Dimension, RemoveAxis};

use csdi_core::{Mode, Seed};

use crate::dataset::{ForecastingConfig, ForecastingDataset, WindowRecord};
use crate::error::{DataError, Result};
use crate::sampler::{RandomSampler, Sampler, SequentialSampler};
use crate::source::SeriesSource;

/// Window records stacked along a leading batch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    /// (B, W, N)
    pub observed_data: Array3<f32>,
    /// (B, W, N)
    pub observed_mask: Array3<f32>,
    /// (B, W, N)
    pub gt_mask: Array3<f32>,
    /// (B, W)
    pub timepoints: Array2<f32>,
    /// (B, N)
    pub feature_id: Array2<f32>,
    /// (B, W, K)
    pub metadata: Option<Array3<f32>>,
    /// (B, n_condit_features)
    pub condit_features: Option<Array2<i64>>,
}

impl WindowBatch {
    /// Stack records produced by one dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if `records` is empty or the records disagree in
    /// shape or in which optional fields they carry.
    pub fn stack(records: &[WindowRecord]) -> Result<Self> {
        let first = records
            .first()
            .ok_or_else(|| DataError::InvalidBatchSize("cannot stack an empty batch".to_string()))?;

        let metadata = if first.metadata.is_some() {
            let views = records
                .iter()
                .map(|r| {
                    r.metadata.as_ref().map(Array2::view).ok_or_else(|| {
                        DataError::ShapeMismatch("metadata missing from some records".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Some(stack_views(&views)?)
        } else {
            None
        };

        let condit_features = match &first.condit_features {
            Some(features) => {
                let k = features.len();
                let mut flat = Vec::with_capacity(records.len() * k);
                for record in records {
                    let row = record
                        .condit_features
                        .as_ref()
                        .filter(|f| f.len() == k)
                        .ok_or_else(|| {
                            DataError::ShapeMismatch(
                                "conditioning features differ between records".to_string(),
                            )
                        })?;
                    flat.extend(row.iter().map(|&c| c as i64));
                }
                Some(
                    Array2::from_shape_vec((records.len(), k), flat)
                        .map_err(|e| DataError::ShapeMismatch(e.to_string()))?,
                )
            }
            None => None,
        };

        Ok(Self {
            observed_data: stack_field(records, |r| r.observed_data.view())?,
            observed_mask: stack_field(records, |r| r.observed_mask.view())?,
            gt_mask: stack_field(records, |r| r.gt_mask.view())?,
            timepoints: stack_field(records, |r| r.timepoints.view())?,
            feature_id: stack_field(records, |r| r.feature_id.view())?,
            metadata,
            condit_features,
        })
    }

    /// Number of windows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observed_data.len_of(Axis(0))
    }

    /// Whether the batch holds no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the batch onto a Burn device.
    #[must_use]
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> WindowTensors<B> {
        WindowTensors {
            observed_data: tensor3(&self.observed_data, device),
            observed_mask: tensor3(&self.observed_mask, device),
            gt_mask: tensor3(&self.gt_mask, device),
            timepoints: tensor2(&self.timepoints, device),
            feature_id: tensor2(&self.feature_id, device),
            metadata: self.metadata.as_ref().map(|m| tensor3(m, device)),
            condit_features: self.condit_features.as_ref().map(|f| {
                let (b, k) = f.dim();
                let flat: Vec<i64> = f.iter().copied().collect();
                Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [b, k]), device)
            }),
        }
    }
}

/// A [`WindowBatch`] on a Burn device.
#[derive(Debug, Clone)]
pub struct WindowTensors<B: Backend> {
    /// (B, W, N)
    pub observed_data: Tensor<B, 3>,
    /// (B, W, N)
    pub observed_mask: Tensor<B, 3>,
    /// (B, W, N)
    pub gt_mask: Tensor<B, 3>,
    /// (B, W)
    pub timepoints: Tensor<B, 2>,
    /// (B, N)
    pub feature_id: Tensor<B, 2>,
    /// (B, W, K)
    pub metadata: Option<Tensor<B, 3>>,
    /// (B, n_condit_features)
    pub condit_features: Option<Tensor<B, 2, Int>>,
}

fn stack_views<D>(views: &[ArrayView<'_, f32, D>]) -> Result<Array<f32, D::Larger>>
where
    D: Dimension,
    D::Larger: RemoveAxis,
{
    ndarray::stack(Axis(0), views).map_err(|e| DataError::ShapeMismatch(e.to_string()))
}

fn stack_field<'a, D, F>(records: &'a [WindowRecord], field: F) -> Result<Array<f32, D::Larger>>
where
    D: Dimension,
    D::Larger: RemoveAxis,
    F: Fn(&'a WindowRecord) -> ArrayView<'a, f32, D>,
{
    let views: Vec<_> = records.iter().map(field).collect();
    stack_views(&views)
}

fn tensor3<B: Backend>(array: &Array3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (a, b, c) = array.dim();
    let flat: Vec<f32> = array.iter().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([a, b, c])
}

fn tensor2<B: Backend>(array: &Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (a, b) = array.dim();
    let flat: Vec<f32> = array.iter().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([a, b])
}

fn tensor1<B: Backend>(array: &Array1<f32>, device: &B::Device) -> Tensor<B, 1> {
    let flat: Vec<f32> = array.iter().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device)
}

/// A loader that yields stacked batches of windows.
///
/// # Example
///
/// ```rust,ignore
/// use csdi_data::WindowLoader;
/// use csdi_core::Seed;
///
/// let loader = WindowLoader::builder(train_ds)
///     .batch_size(8)
///     .shuffle(true)
///     .seed(Seed::new(1))
///     .build()?;
///
/// for epoch in 0..epochs {
///     for batch in loader.iter_epoch(epoch) {
///         let batch = batch?.to_tensors::<B>(&device);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WindowLoader {
    dataset: Arc<ForecastingDataset>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
}

impl WindowLoader {
    /// Create a new loader builder.
    #[must_use]
    pub fn builder(dataset: impl Into<Arc<ForecastingDataset>>) -> WindowLoaderBuilder {
        WindowLoaderBuilder::new(dataset.into())
    }

    /// The dataset.
    #[must_use]
    pub fn dataset(&self) -> &ForecastingDataset {
        &self.dataset
    }

    /// Partition of the underlying dataset.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.dataset.mode()
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether batches are drawn in shuffled order.
    #[must_use]
    pub fn shuffles(&self) -> bool {
        self.shuffle
    }

    /// Number of batches per epoch.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the dataset has no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Iterate over the batches of the first epoch.
    #[must_use]
    pub fn iter(&self) -> WindowLoaderIter<'_> {
        self.iter_epoch(0)
    }

    /// Iterate over the batches of `epoch`.
    ///
    /// With a seed, shuffled epochs are reproducible and differ from each
    /// other; without one they are drawn from entropy.
    #[must_use]
    pub fn iter_epoch(&self, epoch: u64) -> WindowLoaderIter<'_> {
        let n = self.dataset.len();
        let order = if self.shuffle {
            let seed = self.seed.unwrap_or_else(Seed::from_entropy);
            RandomSampler::new(seed.for_epoch(epoch)).sample(n)
        } else {
            SequentialSampler.sample(n)
        };

        WindowLoaderIter {
            loader: self,
            order,
            current_batch: 0,
            n_batches: self.n_batches(),
        }
    }
}

/// Builder for [`WindowLoader`].
#[derive(Debug)]
pub struct WindowLoaderBuilder {
    dataset: Arc<ForecastingDataset>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
}

impl WindowLoaderBuilder {
    /// Create a new builder; shuffling defaults to on for the train partition.
    #[must_use]
    pub fn new(dataset: Arc<ForecastingDataset>) -> Self {
        let shuffle = dataset.mode().shuffles();
        Self {
            dataset,
            batch_size: 8,
            shuffle,
            drop_last: false,
            seed: None,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the loader.
    ///
    /// An empty dataset is accepted and yields no batches.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is zero.
    pub fn build(self) -> Result<WindowLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            tracing::warn!(mode = %self.dataset.mode(), "Loader over an empty dataset");
        }

        Ok(WindowLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
        })
    }
}

/// Iterator over the batches of one epoch.
pub struct WindowLoaderIter<'a> {
    loader: &'a WindowLoader,
    order: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<'a> Iterator for WindowLoaderIter<'a> {
    type Item = Result<WindowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }

        let start = self.current_batch * self.loader.batch_size;
        let end = std::cmp::min(start + self.loader.batch_size, self.order.len());
        self.current_batch += 1;

        let batch = self.order[start..end]
            .iter()
            .map(|&ordinal| self.loader.dataset.get(ordinal))
            .collect::<Result<Vec<_>>>()
            .and_then(|records| WindowBatch::stack(&records));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for WindowLoaderIter<'a> {}

/// Per-channel normalization constants for de-normalizing model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalers {
    /// Per-channel standard deviation.
    pub std: Array1<f32>,
    /// Per-channel mean.
    pub mean: Array1<f32>,
}

impl Scalers {
    /// Undo normalization of values laid out as (.., N).
    #[must_use]
    pub fn denormalize(&self, values: &Array2<f32>) -> Array2<f32> {
        let mut out = values.clone();
        for (mut column, (&m, &s)) in out
            .axis_iter_mut(Axis(1))
            .zip(self.mean.iter().zip(self.std.iter()))
        {
            column.mapv_inplace(|x| x * s + m);
        }
        out
    }

    /// `(std, mean)` as Burn tensors.
    #[must_use]
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 1>, Tensor<B, 1>) {
        (tensor1(&self.std, device), tensor1(&self.mean, device))
    }
}

/// Train, valid and test loaders over one series.
#[derive(Debug, Clone)]
pub struct ForecastingLoaders {
    train: WindowLoader,
    valid: WindowLoader,
    test: WindowLoader,
    scalers: Scalers,
}

impl ForecastingLoaders {
    /// Create a new builder.
    #[must_use]
    pub fn builder(
        source: Arc<SeriesSource>,
        config: ForecastingConfig,
    ) -> ForecastingLoadersBuilder {
        ForecastingLoadersBuilder::new(source, config)
    }

    /// Training loader (shuffled).
    #[must_use]
    pub fn train(&self) -> &WindowLoader {
        &self.train
    }

    /// Validation loader.
    #[must_use]
    pub fn valid(&self) -> &WindowLoader {
        &self.valid
    }

    /// Test loader.
    #[must_use]
    pub fn test(&self) -> &WindowLoader {
        &self.test
    }

    /// Loader for a given partition.
    #[must_use]
    pub fn get(&self, mode: Mode) -> &WindowLoader {
        match mode {
            Mode::Train => &self.train,
            Mode::Valid => &self.valid,
            Mode::Test => &self.test,
        }
    }

    /// Normalization constants.
    #[must_use]
    pub fn scalers(&self) -> &Scalers {
        &self.scalers
    }

    /// Number of channels.
    #[must_use]
    pub fn n_channels(&self) -> usize {
        self.train.dataset().n_channels()
    }

    /// Width of the one-hot metadata, when enabled.
    #[must_use]
    pub fn metadata_width(&self) -> Option<usize> {
        self.train.dataset().metadata_width()
    }
}

/// Builder for [`ForecastingLoaders`].
#[derive(Debug)]
pub struct ForecastingLoadersBuilder {
    source: Arc<SeriesSource>,
    config: ForecastingConfig,
    batch_size: usize,
    seed: Option<Seed>,
}

impl ForecastingLoadersBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(source: Arc<SeriesSource>, config: ForecastingConfig) -> Self {
        Self {
            source,
            config,
            batch_size: 8,
            seed: None,
        }
    }

    /// Set the batch size for all loaders.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the shuffle seed of the training loader.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the three datasets and their loaders.
    ///
    /// Each partition makes its own conditioning draw from the config's
    /// seed, so train, valid and test generally condition on different
    /// channels.
    pub fn build(self) -> Result<ForecastingLoaders> {
        let dataset =
            |mode| ForecastingDataset::from_source(self.source.clone(), mode, &self.config);

        let mut train = WindowLoader::builder(dataset(Mode::Train)?)
            .batch_size(self.batch_size)
            .shuffle(true);
        if let Some(seed) = self.seed {
            train = train.seed(seed.derive("train"));
        }

        let valid = WindowLoader::builder(dataset(Mode::Valid)?)
            .batch_size(self.batch_size)
            .shuffle(false);
        let test = WindowLoader::builder(dataset(Mode::Test)?)
            .batch_size(self.batch_size)
            .shuffle(false);

        Ok(ForecastingLoaders {
            train: train.build()?,
            valid: valid.build()?,
            test: test.build()?,
            scalers: Scalers {
                std: self.source.std().clone(),
                mean: self.source.mean().clone(),
            },
        })
    }
}

/// Build train/valid/test loaders and scalers over one series.
pub fn get_dataloaders(
    source: Arc<SeriesSource>,
    config: &ForecastingConfig,
    batch_size: usize,
    seed: Seed,
) -> Result<ForecastingLoaders> {
    ForecastingLoaders::builder(source, config.clone())
        .batch_size(batch_size)
        .seed(seed)
        .build()
}
