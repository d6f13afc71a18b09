//! One-hot encoding of categorical side information ("time weaver" metadata).

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{DataError, Result};

/// Encode a (T, M) matrix of 1-indexed category codes as concatenated
/// one-hot blocks.
///
/// Each column's block is as wide as the largest code in that column, so the
/// output width depends on the data. Blocks appear in column order, giving a
/// (T, sum of cardinalities) matrix.
///
/// # Errors
///
/// - [`DataError::EmptyMetadata`] if the matrix has no rows or no columns.
/// - [`DataError::InvalidCategory`] if any code is zero or negative.
///
/// # Example
///
/// ```rust
/// use csdi_data::one_hot_encode;
/// use ndarray::array;
///
/// let codes = array![[1i64], [3], [2]];
/// let encoded = one_hot_encode(codes.view()).unwrap();
/// assert_eq!(encoded, array![[1.0f32, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]]);
/// ```
pub fn one_hot_encode(codes: ArrayView2<'_, i64>) -> Result<Array2<f32>> {
    let (n_rows, n_cols) = codes.dim();
    if n_rows == 0 || n_cols == 0 {
        return Err(DataError::EmptyMetadata);
    }

    if let Some(((row, column), &code)) = codes.indexed_iter().find(|(_, &code)| code <= 0) {
        return Err(DataError::InvalidCategory { row, column, code });
    }

    let cardinalities = cardinalities(codes);
    let width: usize = cardinalities.iter().sum();
    let mut encoded = Array2::<f32>::zeros((n_rows, width));

    let mut offset = 0;
    for (column, &cardinality) in codes.axis_iter(Axis(1)).zip(&cardinalities) {
        for (row, &code) in column.iter().enumerate() {
            encoded[[row, offset + code as usize - 1]] = 1.0;
        }
        offset += cardinality;
    }

    Ok(encoded)
}

/// Number of categories per column, taken as the largest code observed.
#[must_use]
pub fn cardinalities(codes: ArrayView2<'_, i64>) -> Vec<usize> {
    codes
        .axis_iter(Axis(1))
        .map(|column| column.iter().copied().max().unwrap_or(0).max(0) as usize)
        .collect()
}
