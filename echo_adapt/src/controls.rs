//! Live control values and their per-block resolution.

use crate::config::FilterConfig;
use crate::predictor::{db_to_linear, ms_to_samples};

/// How a threshold control is expressed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdUnit {
    Linear,
    Decibel,
}

impl ThresholdUnit {
    pub fn to_linear(self, value: f32) -> f32 {
        match self {
            ThresholdUnit::Linear => value,
            ThresholdUnit::Decibel => db_to_linear(value),
        }
    }
}

/// Inclusive range a control is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
}

impl Bounds {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamps `value`; non-finite input falls back to the lower bound.
    pub fn clamp(self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }

    pub(crate) fn is_valid(self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Accepted ranges and units for the live controls of one filter variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLimits {
    pub mu: Bounds,
    pub dtd_threshold: Bounds,
    pub dtd_threshold_unit: ThresholdUnit,
    pub set_threshold: Bounds,
    pub set_threshold_unit: ThresholdUnit,
}

/// Scalar controls a host may change between blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controls {
    /// Modelled echo length in milliseconds.
    pub echo_ms: f32,
    /// Double-talk detector window in milliseconds.
    pub dtd_ms: f32,
    /// Detector threshold, ratio or dB depending on the variant.
    pub dtd_threshold: f32,
    /// Adaptation step size.
    pub mu: f32,
    /// Set-membership floor: smaller errors do not adapt.
    pub set_threshold: f32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            echo_ms: 100.0,
            dtd_ms: 10.0,
            dtd_threshold: 0.5,
            mu: 0.1,
            set_threshold: -120.0,
        }
    }
}

/// Controls clamped and converted into sample counts and linear values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Resolved {
    pub taps: usize,
    pub dtd_len: usize,
    pub dtd_threshold: f32,
    pub mu: f32,
    pub set_threshold: f32,
}

impl Resolved {
    pub fn new(controls: &Controls, config: &FilterConfig) -> Self {
        let limits = &config.limits;
        let taps =
            ms_to_samples(controls.echo_ms, config.sample_rate).min(config.max_echo_samples());
        let dtd_len = ms_to_samples(controls.dtd_ms, config.sample_rate)
            .clamp(1, config.max_dtd_samples());

        Self {
            taps,
            dtd_len,
            dtd_threshold: limits
                .dtd_threshold_unit
                .to_linear(limits.dtd_threshold.clamp(controls.dtd_threshold)),
            mu: limits.mu.clamp(controls.mu),
            set_threshold: limits
                .set_threshold_unit
                .to_linear(limits.set_threshold.clamp(controls.set_threshold)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;

    #[test]
    fn clamps_out_of_range_controls() {
        let config = FilterConfig::preset(Variant::FastNlmsNcr, 8000);
        let controls = Controls {
            echo_ms: 10_000.0,
            dtd_ms: -5.0,
            dtd_threshold: 3.0,
            mu: 9.0,
            set_threshold: -500.0,
        };
        let resolved = Resolved::new(&controls, &config);
        assert_eq!(resolved.taps, config.max_echo_samples());
        assert_eq!(resolved.dtd_len, 1);
        assert_eq!(resolved.dtd_threshold, 1.0);
        assert_eq!(resolved.mu, 2.0);
        assert!((resolved.set_threshold - 1e-6).abs() < 1e-9);
    }

    #[test]
    fn nan_controls_fall_back_to_lower_bound() {
        let config = FilterConfig::preset(Variant::LmsGeigel, 8000);
        let controls = Controls {
            echo_ms: f32::NAN,
            dtd_ms: f32::NAN,
            dtd_threshold: f32::NAN,
            mu: f32::NAN,
            set_threshold: f32::NAN,
        };
        let resolved = Resolved::new(&controls, &config);
        assert_eq!(resolved.taps, 0);
        assert_eq!(resolved.dtd_len, 1);
        assert_eq!(resolved.mu, 0.0);
        assert_eq!(resolved.dtd_threshold, 0.0);
    }

    #[test]
    fn decibel_thresholds_become_linear() {
        let config = FilterConfig::preset(Variant::NlmsNcr, 16_000);
        let controls = Controls {
            dtd_threshold: -20.0,
            set_threshold: -40.0,
            ..Controls::default()
        };
        let resolved = Resolved::new(&controls, &config);
        assert!((resolved.dtd_threshold - 0.1).abs() < 1e-6);
        assert!((resolved.set_threshold - 0.01).abs() < 1e-6);
    }
}
