//! Construction-time configuration and the named filter variants.

use std::fmt;
use std::str::FromStr;

use crate::controls::{Bounds, ControlLimits, Controls, ThresholdUnit};
use crate::dtd::{DetectorKind, NcrComparison};
use crate::error::{EchoError, Result};
use crate::history::CursorDirection;
use crate::predictor::ms_to_samples;
use crate::update::UpdateRule;

/// Regularisation added to the NLMS denominator by the normalised presets.
pub const DEFAULT_EPSILON: f32 = 1e-3;

/// Named echo canceller configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Sign-error LMS without double-talk detection.
    SignLms,
    /// LMS gated by the Geigel detector.
    LmsGeigel,
    /// NLMS with incremental energy tracking, adapting while NCR is below a
    /// threshold given in dB.
    NlmsNcr,
    /// NLMS with incremental energy tracking, adapting while NCR is above a
    /// linear threshold. Models echoes up to two seconds.
    FastNlmsNcr,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::SignLms,
        Variant::LmsGeigel,
        Variant::NlmsNcr,
        Variant::FastNlmsNcr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::SignLms => "sign-lms",
            Variant::LmsGeigel => "lms-geigel",
            Variant::NlmsNcr => "nlms-ncr",
            Variant::FastNlmsNcr => "fast-nlms-ncr",
        }
    }

    /// Control values a host starts from, taken from the middle or lower
    /// quarter of each control range.
    pub fn default_controls(self) -> Controls {
        match self {
            Variant::SignLms => Controls {
                echo_ms: 250.0,
                dtd_ms: 0.0,
                dtd_threshold: 0.0,
                mu: 0.0125,
                set_threshold: 0.0,
            },
            Variant::LmsGeigel => Controls {
                echo_ms: 300.0,
                dtd_ms: 10.0,
                dtd_threshold: 0.5,
                mu: 0.05,
                set_threshold: 0.5,
            },
            Variant::NlmsNcr => Controls {
                echo_ms: 300.0,
                dtd_ms: 10.0,
                dtd_threshold: -30.0,
                mu: 0.5,
                set_threshold: -60.0,
            },
            Variant::FastNlmsNcr => Controls {
                echo_ms: 500.0,
                dtd_ms: 10.0,
                dtd_threshold: 0.5,
                mu: 0.5,
                set_threshold: -90.0,
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = EchoError;

    fn from_str(s: &str) -> Result<Self> {
        Variant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EchoError::UnknownVariant(s.to_owned()))
    }
}

/// Everything fixed for the lifetime of one filter instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub sample_rate: u32,
    /// Longest echo path the instance can model.
    pub max_echo_ms: f32,
    /// Longest double-talk detector window.
    pub max_dtd_ms: f32,
    pub rule: UpdateRule,
    pub detector: DetectorKind,
    pub direction: CursorDirection,
    pub epsilon: f32,
    /// Seed tap 0 with unity on activation.
    pub identity_start: bool,
    pub limits: ControlLimits,
}

impl FilterConfig {
    pub fn preset(variant: Variant, sample_rate: u32) -> Self {
        let db_floor = Bounds::new(-120.0, 0.0);
        let unit_ratio = Bounds::new(0.0, 1.0);
        match variant {
            Variant::SignLms => Self {
                sample_rate,
                max_echo_ms: 500.0,
                max_dtd_ms: 0.0,
                rule: UpdateRule::SignError,
                detector: DetectorKind::AlwaysAdapt,
                direction: CursorDirection::Forward,
                epsilon: DEFAULT_EPSILON,
                identity_start: false,
                limits: ControlLimits {
                    mu: Bounds::new(0.0, 0.05),
                    dtd_threshold: Bounds::new(0.0, 0.0),
                    dtd_threshold_unit: ThresholdUnit::Linear,
                    set_threshold: Bounds::new(0.0, 0.0),
                    set_threshold_unit: ThresholdUnit::Linear,
                },
            },
            Variant::LmsGeigel => Self {
                sample_rate,
                max_echo_ms: 600.0,
                max_dtd_ms: 20.0,
                rule: UpdateRule::Lms,
                detector: DetectorKind::Geigel,
                direction: CursorDirection::Forward,
                epsilon: DEFAULT_EPSILON,
                identity_start: false,
                limits: ControlLimits {
                    mu: Bounds::new(0.0, 0.2),
                    dtd_threshold: unit_ratio,
                    dtd_threshold_unit: ThresholdUnit::Linear,
                    set_threshold: unit_ratio,
                    set_threshold_unit: ThresholdUnit::Linear,
                },
            },
            Variant::NlmsNcr => Self {
                sample_rate,
                max_echo_ms: 600.0,
                max_dtd_ms: 20.0,
                rule: UpdateRule::FastNlms,
                detector: DetectorKind::Ncr(NcrComparison::Below),
                direction: CursorDirection::Backward,
                epsilon: DEFAULT_EPSILON,
                identity_start: true,
                limits: ControlLimits {
                    mu: Bounds::new(0.0, 1.0),
                    dtd_threshold: Bounds::new(-60.0, 0.0),
                    dtd_threshold_unit: ThresholdUnit::Decibel,
                    set_threshold: db_floor,
                    set_threshold_unit: ThresholdUnit::Decibel,
                },
            },
            Variant::FastNlmsNcr => Self {
                sample_rate,
                max_echo_ms: 2000.0,
                max_dtd_ms: 20.0,
                rule: UpdateRule::FastNlms,
                detector: DetectorKind::Ncr(NcrComparison::Above),
                direction: CursorDirection::Backward,
                epsilon: DEFAULT_EPSILON,
                identity_start: true,
                limits: ControlLimits {
                    mu: Bounds::new(0.0, 2.0),
                    dtd_threshold: unit_ratio,
                    dtd_threshold_unit: ThresholdUnit::Linear,
                    set_threshold: db_floor,
                    set_threshold_unit: ThresholdUnit::Decibel,
                },
            },
        }
    }

    pub fn with_max_echo_ms(mut self, ms: f32) -> Self {
        self.max_echo_ms = ms;
        self
    }

    pub fn with_max_dtd_ms(mut self, ms: f32) -> Self {
        self.max_dtd_ms = ms;
        self
    }

    pub fn with_rule(mut self, rule: UpdateRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn with_detector(mut self, detector: DetectorKind) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_direction(mut self, direction: CursorDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_identity_start(mut self, identity_start: bool) -> Self {
        self.identity_start = identity_start;
        self
    }

    pub fn with_limits(mut self, limits: ControlLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn max_echo_samples(&self) -> usize {
        ms_to_samples(self.max_echo_ms, self.sample_rate)
    }

    /// Never zero: a detector window always covers the current sample.
    pub fn max_dtd_samples(&self) -> usize {
        ms_to_samples(self.max_dtd_ms, self.sample_rate).max(1)
    }

    /// Minimum history length. One sample longer than the echo path so the
    /// sample leaving the energy window is still readable.
    pub(crate) fn history_len(&self) -> Result<usize> {
        self.max_echo_samples()
            .max(self.max_dtd_samples())
            .checked_add(1)
            .ok_or(EchoError::InvalidConfig("history length overflows usize"))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EchoError::InvalidConfig("sample rate must be positive"));
        }
        if !self.max_echo_ms.is_finite() || self.max_echo_ms < 0.0 {
            return Err(EchoError::InvalidConfig("maximum echo length must be non-negative"));
        }
        if !self.max_dtd_ms.is_finite() || self.max_dtd_ms < 0.0 {
            return Err(EchoError::InvalidConfig("maximum DTD window must be non-negative"));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(EchoError::InvalidConfig("epsilon must be positive"));
        }
        let limits = &self.limits;
        if !(limits.mu.is_valid()
            && limits.dtd_threshold.is_valid()
            && limits.set_threshold.is_valid())
        {
            return Err(EchoError::InvalidConfig("control bounds must be finite and ordered"));
        }
        self.history_len().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_round_trip() {
        for variant in Variant::ALL {
            assert_eq!(variant.name().parse::<Variant>().unwrap(), variant);
        }
        assert_eq!("FAST-NLMS-NCR".parse::<Variant>().unwrap(), Variant::FastNlmsNcr);
        assert!(matches!(
            "rls".parse::<Variant>(),
            Err(EchoError::UnknownVariant(name)) if name == "rls"
        ));
    }

    #[test]
    fn presets_validate() {
        for variant in Variant::ALL {
            FilterConfig::preset(variant, 48_000).validate().unwrap();
        }
    }

    #[test]
    fn history_covers_echo_and_window() {
        let config = FilterConfig::preset(Variant::LmsGeigel, 8000).with_max_echo_ms(50.0);
        assert_eq!(config.max_echo_samples(), 400);
        assert_eq!(config.max_dtd_samples(), 160);
        assert_eq!(config.history_len(), Ok(401));

        let config = FilterConfig::preset(Variant::SignLms, 8000).with_max_echo_ms(0.0);
        assert_eq!(config.max_dtd_samples(), 1);
        assert_eq!(config.history_len(), Ok(2));
    }

    #[test]
    fn rejects_broken_configs() {
        let base = FilterConfig::preset(Variant::NlmsNcr, 8000);
        let zero_rate = FilterConfig {
            sample_rate: 0,
            ..base.clone()
        };
        assert!(zero_rate.validate().is_err());
        assert!(base.clone().with_epsilon(0.0).validate().is_err());
        assert!(base.clone().with_max_echo_ms(f32::INFINITY).validate().is_err());
        let mut limits = base.limits;
        limits.mu = Bounds::new(1.0, 0.0);
        assert!(base.with_limits(limits).validate().is_err());
    }

    #[test]
    fn saturated_echo_length_is_an_error() {
        let config = FilterConfig::preset(Variant::FastNlmsNcr, 48_000).with_max_echo_ms(f32::MAX);
        assert_eq!(config.max_echo_samples(), usize::MAX);
        assert_eq!(
            config.history_len(),
            Err(EchoError::InvalidConfig("history length overflows usize"))
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn ncr_presets_track_energy_incrementally() {
        for variant in [Variant::NlmsNcr, Variant::FastNlmsNcr] {
            assert_eq!(FilterConfig::preset(variant, 8000).rule, UpdateRule::FastNlms);
        }
        assert_eq!(
            FilterConfig::preset(Variant::NlmsNcr, 8000).detector,
            DetectorKind::Ncr(NcrComparison::Below)
        );
    }
}
