//! FIR echo prediction and unit conversions for live controls.

use crate::error::Result;
use crate::history::{HistoryBuffer, alloc_zeroed};

/// Converts a duration in milliseconds to a whole number of samples.
///
/// Negative and non-finite durations map to zero samples.
pub fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    (f64::from(ms) * f64::from(sample_rate) / 1000.0).floor() as usize
}

/// Converts a gain in decibels to a linear amplitude ratio.
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db * 0.05)
}

/// Converts a linear amplitude ratio to decibels.
pub fn linear_to_db(value: f32) -> f32 {
    20.0 * value.log10()
}

/// Adaptive FIR taps, sized once for the longest supported echo path.
#[derive(Debug, Clone)]
pub struct Coefficients {
    taps: Vec<f32>,
}

impl Coefficients {
    pub(crate) fn zeroed(len: usize) -> Result<Self> {
        Ok(Self {
            taps: alloc_zeroed("coefficient vector", len)?,
        })
    }

    /// Zeroes all taps. With `identity` the first tap starts at unity, so the
    /// filter initially predicts the reference itself.
    pub fn reset(&mut self, identity: bool) {
        self.taps.fill(0.0);
        if identity {
            if let Some(first) = self.taps.first_mut() {
                *first = 1.0;
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.taps.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.taps
    }

    pub(crate) fn active_mut(&mut self, taps: usize) -> &mut [f32] {
        let taps = taps.min(self.taps.len());
        &mut self.taps[..taps]
    }

    /// Echo estimate `Σ_{i<taps} coef[i] · x(n-i)`; zero when `taps` is zero.
    pub fn predict(&self, history: &HistoryBuffer, taps: usize) -> f32 {
        let taps = taps.min(self.taps.len());
        if taps == 0 {
            return 0.0;
        }
        history.window(taps).dot(&self.taps[..taps])
    }
}
