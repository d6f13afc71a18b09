//! Random selection of conditioning channels.

use ndarray::Array2;
use rand::seq::index;
use rand::Rng;

use crate::error::{DataError, Result};

/// The conditioning mask of a dataset and the channels it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditioning {
    mask: Array2<f32>,
    features: Option<Vec<usize>>,
}

impl Conditioning {
    /// Derive the conditioning mask from a presence mask.
    ///
    /// With `n_condit_features <= 0` every present value may condition the
    /// model and the mask equals `presence_mask`. Otherwise
    /// `n_condit_features` distinct channels are drawn uniformly without
    /// replacement and the mask keeps the presence mask only on those
    /// columns.
    ///
    /// # Errors
    ///
    /// [`DataError::TooManyConditFeatures`] if more features are requested
    /// than the mask has channels.
    pub fn select<R: Rng + ?Sized>(
        presence_mask: &Array2<f32>,
        n_condit_features: i64,
        rng: &mut R,
    ) -> Result<Self> {
        if n_condit_features <= 0 {
            return Ok(Self {
                mask: presence_mask.clone(),
                features: None,
            });
        }

        let n_channels = presence_mask.ncols();
        let requested = n_condit_features as usize;
        if requested > n_channels {
            return Err(DataError::TooManyConditFeatures {
                requested,
                available: n_channels,
            });
        }

        let features = index::sample(rng, n_channels, requested).into_vec();
        tracing::debug!(?features, "Selected conditioning channels");

        let mut mask = Array2::<f32>::zeros(presence_mask.raw_dim());
        for &channel in &features {
            mask.column_mut(channel).assign(&presence_mask.column(channel));
        }

        Ok(Self {
            mask,
            features: Some(features),
        })
    }

    /// Conditioning mask (T, N).
    #[must_use]
    pub fn mask(&self) -> &Array2<f32> {
        &self.mask
    }

    /// Chosen channels in draw order, when a subset was selected.
    #[must_use]
    pub fn features(&self) -> Option<&[usize]> {
        self.features.as_deref()
    }
}
