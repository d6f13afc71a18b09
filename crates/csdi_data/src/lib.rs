//! # csdi_data
//!
//! Windowed multivariate time series datasets for CSDI-style forecasting.
//!
//! This crate provides:
//! - [`SeriesSource`] for loading and normalizing a series with its presence mask
//! - [`Conditioning`] for drawing the channels a model is conditioned on
//! - [`one_hot_encode`] for categorical side information
//! - [`windows::build_use_index`] for the interleaved train/valid/test window starts
//! - [`ForecastingDataset`] producing one [`WindowRecord`] per window
//! - [`WindowLoader`] and [`ForecastingLoaders`] for batched iteration
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use csdi_core::Seed;
//! use csdi_data::{get_dataloaders, ForecastingConfig, SeriesSource};
//!
//! let config = ForecastingConfig::new("electricity").with_n_condit_features(5);
//! let source = SeriesSource::load("./data", &config.dataset, config.time_weaver)?;
//! let loaders = get_dataloaders(Arc::new(source), &config, 8, Seed::new(1))?;
//!
//! for batch in loaders.train().iter() {
//!     let batch = batch?;
//!     // batch.observed_data: (B, W, N)
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod conditioning;
mod dataset;
mod error;
pub mod io;
mod loader;
mod metadata;
pub mod registry;
mod sampler;
mod source;
pub mod windows;

pub use conditioning::Conditioning;
pub use dataset::{
    ForecastingConfig, ForecastingDataset, WindowRecord, DEFAULT_HISTORY_LENGTH,
    DEFAULT_PREDICTION_LENGTH,
};
pub use error::{DataError, ErrorKind, Result};
pub use loader::{
    get_dataloaders, ForecastingLoaders, ForecastingLoadersBuilder, Scalers, WindowBatch,
    WindowLoader, WindowLoaderBuilder, WindowLoaderIter, WindowTensors,
};
pub use metadata::{cardinalities, one_hot_encode};
pub use registry::{list_datasets, DatasetInfo};
pub use sampler::{RandomSampler, Sampler, SequentialSampler};
pub use source::SeriesSource;

/// Default base storage location for dataset folders.
pub const DATA_DIR: &str = "data";

/// Environment variable overriding [`DATA_DIR`].
pub const DATA_DIR_ENV: &str = "CSDI_DATA_ROOT";

/// Get the default data root: `$CSDI_DATA_ROOT` if set, else `./data`.
#[must_use]
pub fn data_root() -> std::path::PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from(DATA_DIR))
}
