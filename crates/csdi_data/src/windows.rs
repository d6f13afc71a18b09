//! Window-start index sets for the train/valid/test partitions.
//!
//! Valid and test windows are interleaved with the training data: the series
//! is cut into periodic blocks of `7 + 3 * prediction_length` steps and each
//! evaluation partition takes one window per block at its own offset.

use csdi_core::Mode;

/// Offset of the first block boundary, shared by every partition.
pub const BLOCK_OFFSET: usize = 7;

/// Consecutive starts the training partition takes from each block.
pub const TRAIN_STARTS_PER_BLOCK: usize = 8;

/// Distance between sampled starts of the valid and test partitions.
#[must_use]
pub const fn block_stride(prediction_length: usize) -> usize {
    BLOCK_OFFSET + 3 * prediction_length
}

/// Start offset of the first window a partition samples.
#[must_use]
pub const fn first_offset(mode: Mode, prediction_length: usize) -> usize {
    match mode {
        Mode::Train => 0,
        Mode::Valid => BLOCK_OFFSET + prediction_length,
        Mode::Test => BLOCK_OFFSET + 2 * prediction_length,
    }
}

/// Every start offset that leaves room for a full window.
///
/// The last possible start `total_length - window_length` is excluded.
#[must_use]
pub fn all_starts(total_length: usize, window_length: usize) -> Vec<usize> {
    (0..total_length.saturating_sub(window_length)).collect()
}

/// Build the ordered window starts used by a partition.
///
/// Train ends up with every start from [`all_starts`]. The block-wise
/// training selection is still computed and then replaced, so training
/// overlaps the evaluation windows. Valid and test take
/// `first_offset, first_offset + stride, ...` while below
/// `total_length - window_length`.
///
/// A series no longer than one window yields an empty index.
///
/// # Example
///
/// ```rust
/// use csdi_core::Mode;
/// use csdi_data::windows::build_use_index;
///
/// let valid = build_use_index(Mode::Valid, 1000, 192, 24);
/// assert_eq!(&valid[..3], &[31, 110, 189]);
/// assert_eq!(build_use_index(Mode::Train, 1000, 192, 24).len(), 808);
/// ```
#[must_use]
pub fn build_use_index(
    mode: Mode,
    total_length: usize,
    window_length: usize,
    prediction_length: usize,
) -> Vec<usize> {
    let all_index = all_starts(total_length, window_length);
    let limit = all_index.len();
    let stride = block_stride(prediction_length);

    match mode {
        Mode::Train => {
            let blocked = blocked_train_starts(&all_index, total_length, stride);
            tracing::trace!(
                blocked = blocked.len(),
                all = limit,
                "Discarding block-wise train starts in favour of all starts"
            );
            all_index
        }
        Mode::Valid | Mode::Test => {
            let mut use_index = Vec::with_capacity(limit / stride + 1);
            let mut step = first_offset(mode, prediction_length);
            while step < limit {
                use_index.push(all_index[step]);
                step += stride;
            }
            use_index
        }
    }
}

/// Up to [`TRAIN_STARTS_PER_BLOCK`] consecutive starts at the head of each
/// block.
fn blocked_train_starts(all_index: &[usize], total_length: usize, stride: usize) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut step = 0;
    while step < all_index.len() {
        let take = TRAIN_STARTS_PER_BLOCK.min(total_length - step);
        let end = (step + take).min(all_index.len());
        starts.extend_from_slice(&all_index[step..end]);
        step += stride;
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_and_offsets() {
        assert_eq!(block_stride(24), 79);
        assert_eq!(first_offset(Mode::Valid, 24), 31);
        assert_eq!(first_offset(Mode::Test, 24), 55);
    }

    #[test]
    fn test_train_covers_all_starts() {
        for (t, h, p) in [(1000, 168, 24), (500, 0, 24), (200, 100, 24), (50, 10, 5)] {
            let w = h + p;
            let train = build_use_index(Mode::Train, t, w, p);
            assert_eq!(train.len(), t - w);
            assert_eq!(train, all_starts(t, w));
        }
    }

    #[test]
    fn test_valid_offsets() {
        let valid = build_use_index(Mode::Valid, 1000, 192, 24);
        let expected: Vec<usize> = (31..808).step_by(79).collect();
        assert_eq!(valid, expected);
        assert_eq!(&valid[..4], &[31, 110, 189, 268]);
        assert_eq!(*valid.last().unwrap(), 742);
    }

    #[test]
    fn test_test_offsets() {
        let test = build_use_index(Mode::Test, 1000, 192, 24);
        assert_eq!(&test[..3], &[55, 134, 213]);
        assert!(test.iter().all(|&s| s < 808));
    }

    #[test]
    fn test_valid_and_test_disjoint() {
        let valid = build_use_index(Mode::Valid, 5000, 192, 24);
        let test = build_use_index(Mode::Test, 5000, 192, 24);
        assert!(valid.iter().all(|s| !test.contains(s)));
    }

    #[test]
    fn test_short_series_is_empty() {
        for mode in Mode::ALL {
            assert!(build_use_index(mode, 192, 192, 24).is_empty());
            assert!(build_use_index(mode, 100, 192, 24).is_empty());
        }
    }

    #[test]
    fn test_first_offset_past_end() {
        // valid begins at 31, so it needs at least 32 starts
        assert!(build_use_index(Mode::Valid, 222, 192, 24).is_empty());
        assert!(build_use_index(Mode::Valid, 223, 192, 24).is_empty());
        assert_eq!(build_use_index(Mode::Valid, 224, 192, 24), vec![31]);
    }

    #[test]
    fn test_blocked_train_starts() {
        let all = all_starts(300, 192);
        let blocked = blocked_train_starts(&all, 300, 79);
        assert_eq!(blocked, vec![0, 1, 2, 3, 4, 5, 6, 7, 79, 80, 81, 82, 83, 84, 85, 86]);
    }
}
