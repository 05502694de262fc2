//! Double-talk detection.
//!
//! A detector decides, sample by sample, whether the desired signal is
//! dominated by echo so the filter may adapt. Near-end speech has to freeze
//! adaptation or it corrupts the echo path estimate.

use crate::controls::Resolved;
use crate::error::Result;
use crate::history::{HistoryBuffer, alloc_zeroed};

/// Which side of the threshold lets the NCR detector adapt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcrComparison {
    /// Adapt while `NCR > threshold`.
    Above,
    /// Adapt while `NCR < threshold`.
    Below,
}

impl NcrComparison {
    fn permits(self, ncr: f32, threshold: f32) -> bool {
        match self {
            NcrComparison::Above => ncr > threshold,
            NcrComparison::Below => ncr < threshold,
        }
    }
}

/// Detector selection for a filter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// No detection; every sample may adapt.
    AlwaysAdapt,
    /// Peak ratio `|d(n)| / max|x(n-k)|` against the threshold.
    Geigel,
    /// Normalised cross-correlation between desired and reference signals.
    Ncr(NcrComparison),
}

/// Smoothed statistics kept by the NCR detector.
#[derive(Debug, Clone)]
pub(crate) struct NcrState {
    comparison: NcrComparison,
    pdx: Vec<f32>,
    d_var: f32,
}

#[derive(Debug, Clone)]
pub(crate) enum Detector {
    AlwaysAdapt,
    Geigel,
    Ncr(NcrState),
}

impl Detector {
    pub fn new(kind: DetectorKind, max_window: usize) -> Result<Self> {
        Ok(match kind {
            DetectorKind::AlwaysAdapt => Detector::AlwaysAdapt,
            DetectorKind::Geigel => Detector::Geigel,
            DetectorKind::Ncr(comparison) => Detector::Ncr(NcrState {
                comparison,
                pdx: alloc_zeroed("cross-correlation vector", max_window.max(1))?,
                d_var: 0.0,
            }),
        })
    }

    pub fn reset(&mut self) {
        if let Detector::Ncr(state) = self {
            state.pdx.fill(0.0);
            state.d_var = 0.0;
        }
    }

    /// Whether the error must also clear the set-membership floor.
    pub fn gates_on_magnitude(&self) -> bool {
        !matches!(self, Detector::AlwaysAdapt)
    }

    /// Updates detector state with the current sample and reports whether
    /// adaptation is allowed. Must run every sample so the smoothed statistics
    /// stay continuous.
    pub fn permits(
        &mut self,
        history: &HistoryBuffer,
        coefs: &[f32],
        desired: f32,
        controls: &Resolved,
    ) -> bool {
        match self {
            Detector::AlwaysAdapt => true,
            Detector::Geigel => {
                let peak = history.window(controls.dtd_len).peak();
                // Silent reference: there is no echo to learn from.
                if peak <= 0.0 {
                    return false;
                }
                desired.abs() / peak < controls.dtd_threshold
            }
            Detector::Ncr(state) => {
                let len = controls.dtd_len.min(state.pdx.len());
                let gamma = (len as f32 - 1.0) / len as f32;
                let gain = 1.0 - gamma;

                state.d_var = gamma * state.d_var + gain * desired * desired;
                let pdx = &mut state.pdx[..len];
                history.window(len).smooth_into(pdx, gamma, gain * desired);

                let ncr = pdx
                    .iter()
                    .zip(coefs)
                    .fold(0.0f32, |acc, (p, c)| acc + p * c)
                    / state.d_var;
                ncr.is_finite() && state.comparison.permits(ncr, controls.dtd_threshold)
            }
        }
    }
}
