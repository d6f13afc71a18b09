//! End-to-end tests for loading a stored dataset and cutting it into windows.
//!
//! Fixtures are written as npz/npy files into a temporary data root laid out
//! like the real one (`<root>/electricity_nips/...`).

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use ndarray::{s, Array1, Array2};
use ndarray_npy::{NpzWriter, WriteNpyExt};
use tempfile::TempDir;

use csdi_core::{Mode, Seed};
use csdi_data::io::{MEANSTD_FILE, METADATA_FILE, SERIES_FILE};
use csdi_data::{
    get_dataloaders, DataError, ErrorKind, ForecastingConfig, ForecastingDataset, SeriesSource,
};

const T: usize = 1000;
const N: usize = 370;

/// Write an electricity-shaped dataset with a few missing values.
fn write_fixture(root: &Path, with_metadata: bool) {
    let dir = root.join("electricity_nips");
    fs::create_dir_all(&dir).unwrap();

    let data = Array2::from_shape_fn((T, N), |(t, c)| (t % 24) as f64 + c as f64);
    let mask = Array2::from_shape_fn((T, N), |(t, c)| {
        if (t * 7 + c) % 11 == 0 {
            0.0
        } else {
            1.0
        }
    });
    let mut npz = NpzWriter::new(File::create(dir.join(SERIES_FILE)).unwrap());
    npz.add_array("data", &data).unwrap();
    npz.add_array("mask", &mask).unwrap();
    npz.finish().unwrap();

    let mean = Array1::from_shape_fn(N, |c| 11.5 + c as f64);
    let std = Array1::from_elem(N, 2.0f64);
    let mut npz = NpzWriter::new(File::create(dir.join(MEANSTD_FILE)).unwrap());
    npz.add_array("mean", &mean).unwrap();
    npz.add_array("std", &std).unwrap();
    npz.finish().unwrap();

    if with_metadata {
        // hour of day (24) and day of week (7)
        let codes = Array2::from_shape_fn((T, 2), |(t, j)| match j {
            0 => (t % 24) as i64 + 1,
            _ => ((t / 24) % 7) as i64 + 1,
        });
        codes.write_npy(File::create(dir.join(METADATA_FILE)).unwrap()).unwrap();
    }
}

fn fixture(with_metadata: bool) -> TempDir {
    let root = tempfile::tempdir().unwrap();
    write_fixture(root.path(), with_metadata);
    root
}

#[test]
fn test_load_normalizes() {
    let root = fixture(false);
    let source = SeriesSource::load(root.path(), "electricity", false).unwrap();
    assert_eq!((source.len(), source.n_channels()), (T, N));
    // t = 0, c = 0: (0 - 11.5) / 2
    assert_eq!(source.series()[[0, 0]], -5.75);
    assert_eq!(source.series()[[23, 5]], 5.75);
    assert!(source.metadata_codes().is_none());
}

#[test]
fn test_partition_sizes() {
    let root = fixture(false);
    let config = ForecastingConfig::new("electricity");

    let train = ForecastingDataset::load(root.path(), Mode::Train, &config).unwrap();
    assert_eq!(train.len(), 808);
    assert_eq!(train.use_index(), (0..808).collect::<Vec<_>>().as_slice());

    let valid = ForecastingDataset::load(root.path(), Mode::Valid, &config).unwrap();
    assert_eq!(&valid.use_index()[..3], &[31, 110, 189]);
    assert!(valid.use_index().windows(2).all(|w| w[1] - w[0] == 79));
    assert!(valid.use_index().iter().all(|&s| s < 808));

    let test = ForecastingDataset::load(root.path(), Mode::Test, &config).unwrap();
    assert_eq!(test.use_index()[0], 55);
}

#[test]
fn test_masking_policy_on_every_valid_window() {
    let root = fixture(false);
    let source = Arc::new(SeriesSource::load(root.path(), "electricity", false).unwrap());
    let config = ForecastingConfig::new("electricity")
        .with_n_condit_features(5)
        .with_seed(Seed::new(21));
    let ds = ForecastingDataset::from_source(source.clone(), Mode::Valid, &config).unwrap();

    for (ordinal, &start) in ds.use_index().iter().enumerate() {
        let record = ds.get(ordinal).unwrap();
        assert!(record.gt_mask.slice(s![168.., ..]).iter().all(|&v| v == 0.0));
        assert_eq!(
            record.observed_mask.slice(s![168.., ..]),
            source.presence_mask().slice(s![start + 168..start + 192, ..])
        );
    }
}

#[test]
fn test_five_conditioning_channels() {
    let root = fixture(false);
    let source = Arc::new(SeriesSource::load(root.path(), "electricity", false).unwrap());
    let config = ForecastingConfig::new("electricity").with_n_condit_features(5);
    let ds = ForecastingDataset::from_source(source.clone(), Mode::Train, &config).unwrap();

    let mut features = ds.condit_features().unwrap().to_vec();
    features.sort_unstable();
    features.dedup();
    assert_eq!(features.len(), 5);

    let mask = ds.conditioning_mask();
    for c in 0..N {
        let column = mask.column(c);
        if features.contains(&c) {
            assert_eq!(column, source.presence_mask().column(c));
        } else {
            assert!(column.iter().all(|&v| v == 0.0));
        }
    }

    let record = ds.get(100).unwrap();
    assert_eq!(record.condit_features.unwrap().len(), 5);
}

#[test]
fn test_too_many_conditioning_channels() {
    let root = fixture(false);
    let config = ForecastingConfig::new("electricity").with_n_condit_features(400);
    let err = ForecastingDataset::load(root.path(), Mode::Train, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, DataError::TooManyConditFeatures { requested: 400, available: 370 }));
}

#[test]
fn test_metadata_from_disk() {
    let root = fixture(true);
    let config = ForecastingConfig::new("electricity").with_time_weaver(true);
    let ds = ForecastingDataset::load(root.path(), Mode::Test, &config).unwrap();
    assert_eq!(ds.metadata_width(), Some(31));

    let record = ds.get(0).unwrap();
    let metadata = record.metadata.unwrap();
    assert_eq!(metadata.dim(), (192, 31));
    // one hour-of-day and one day-of-week flag per step
    assert!(metadata.rows().into_iter().all(|row| row.sum() == 2.0));
}

#[test]
fn test_metadata_file_missing() {
    let root = fixture(false);
    let config = ForecastingConfig::new("electricity").with_time_weaver(true);
    let err = ForecastingDataset::load(root.path(), Mode::Train, &config).unwrap_err();
    assert!(matches!(err, DataError::IoError(_)));
}

#[test]
fn test_unknown_dataset() {
    let root = fixture(false);
    let err = ForecastingDataset::load(root.path(), Mode::Train, &ForecastingConfig::new("solar"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_concurrent_reads_match() {
    let root = fixture(false);
    let config = ForecastingConfig::new("electricity").with_n_condit_features(3);
    let ds = ForecastingDataset::load(root.path(), Mode::Train, &config).unwrap();
    let expected: Vec<_> = (0..16).map(|i| ds.get(i * 50).unwrap()).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| (0..16).map(|i| ds.get(i * 50).unwrap()).collect::<Vec<_>>()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_loaders_over_stored_dataset() {
    let root = fixture(false);
    let config = ForecastingConfig::new("electricity").with_history_length(48);
    let source = Arc::new(SeriesSource::load(root.path(), &config.dataset, false).unwrap());
    let loaders = get_dataloaders(source, &config, 64, Seed::new(1)).unwrap();

    // W = 72
    assert_eq!(loaders.train().len(), T - 72);
    let batch = loaders.valid().iter().next().unwrap().unwrap();
    assert_eq!(batch.observed_data.dim(), (batch.len(), 72, N));
    assert_eq!(loaders.scalers().std.len(), N);
}
