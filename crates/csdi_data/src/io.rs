//! I/O utilities for reading persisted series artifacts.
//!
//! A dataset folder holds three NumPy files:
//! - `data.npz` with arrays `data` (T, N) and `mask` (T, N)
//! - `meanstd.npz` with arrays `mean` (N) and `std` (N)
//! - `metadata.npy`, an integer (T, M) matrix of categorical codes (optional)

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use ndarray::{Array, Array1, Array2, Dimension, Ix2, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpyExt, ReadableElement};

use crate::error::{DataError, Result};

/// Series and presence mask archive.
pub const SERIES_FILE: &str = "data.npz";
/// Per-channel mean and standard deviation archive.
pub const MEANSTD_FILE: &str = "meanstd.npz";
/// Categorical metadata matrix.
pub const METADATA_FILE: &str = "metadata.npy";

/// Read the raw series and its presence mask from a `data.npz` archive.
///
/// The series may be stored as f32 or f64. The mask may additionally be
/// stored as bool or as an integer array of 0/1 values.
pub fn read_series_npz<P: AsRef<Path>>(path: P) -> Result<(Array2<f32>, Array2<f32>)> {
    let mut npz = open_npz(path.as_ref())?;
    let data = read_f32_member(&mut npz, "data")?;
    let mask = read_mask_member(&mut npz, "mask")?;
    Ok((data, mask))
}

/// Read per-channel mean and std vectors from a `meanstd.npz` archive.
pub fn read_meanstd_npz<P: AsRef<Path>>(path: P) -> Result<(Array1<f32>, Array1<f32>)> {
    let mut npz = open_npz(path.as_ref())?;
    let mean = read_f32_member(&mut npz, "mean")?;
    let std = read_f32_member(&mut npz, "std")?;
    Ok((mean, std))
}

/// Read the categorical metadata matrix from a `.npy` file.
///
/// Codes may be stored as i64 or i32.
pub fn read_metadata_npy<P: AsRef<Path>>(path: P) -> Result<Array2<i64>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    match Array2::<i64>::read_npy(reader) {
        Ok(arr) => Ok(arr),
        Err(e) => {
            let reader = BufReader::new(File::open(path)?);
            let arr: Array2<i32> = Array2::<i32>::read_npy(reader).map_err(|_| {
                DataError::FormatError(format!("Failed to read {:?}: {}", path, e))
            })?;
            Ok(arr.mapv(i64::from))
        }
    }
}

fn open_npz(path: &Path) -> Result<NpzReader<File>> {
    let file = File::open(path)?;
    NpzReader::new(file)
        .map_err(|e| DataError::FormatError(format!("Failed to read npz file {:?}: {}", path, e)))
}

/// Find an archive member by array name, with or without the `.npy` suffix.
fn member_name<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> Result<String> {
    let names = npz
        .names()
        .map_err(|e| DataError::FormatError(format!("Failed to list npz members: {}", e)))?;
    names
        .into_iter()
        .find(|n| n == name || n.strip_suffix(".npy") == Some(name))
        .ok_or_else(|| DataError::FormatError(format!("Array '{}' not found in npz", name)))
}

fn read_member<R, T, D>(npz: &mut NpzReader<R>, member: &str) -> Result<Array<T, D>>
where
    R: Read + Seek,
    T: ReadableElement,
    D: Dimension,
{
    npz.by_name::<OwnedRepr<T>, D>(member)
        .map_err(|e| DataError::FormatError(format!("Failed to read '{}' from npz: {}", member, e)))
}

fn read_f32_member<R, D>(npz: &mut NpzReader<R>, name: &str) -> Result<Array<f32, D>>
where
    R: Read + Seek,
    D: Dimension,
{
    let member = member_name(npz, name)?;
    match read_member::<R, f32, D>(npz, &member) {
        Ok(arr) => Ok(arr),
        Err(_) => {
            let arr = read_member::<R, f64, D>(npz, &member)?;
            Ok(arr.mapv(|x| x as f32))
        }
    }
}

fn read_mask_member<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> Result<Array2<f32>> {
    if let Ok(mask) = read_f32_member::<R, Ix2>(npz, name) {
        return Ok(mask);
    }

    let member = member_name(npz, name)?;
    if let Ok(arr) = read_member::<R, bool, Ix2>(npz, &member) {
        return Ok(arr.mapv(|present| if present { 1.0 } else { 0.0 }));
    }
    if let Ok(arr) = read_member::<R, i64, Ix2>(npz, &member) {
        return Ok(arr.mapv(|x| x as f32));
    }
    if let Ok(arr) = read_member::<R, i32, Ix2>(npz, &member) {
        return Ok(arr.mapv(|x| x as f32));
    }
    let arr = read_member::<R, u8, Ix2>(npz, &member).map_err(|_| {
        DataError::FormatError(format!("Array '{}' must be float, bool or integer", member))
    })?;
    Ok(arr.mapv(f32::from))
}
