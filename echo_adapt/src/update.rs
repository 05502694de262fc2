//! Coefficient adaptation rules.

use crate::history::HistoryBuffer;

/// Gradient rule applied to the active taps when adaptation is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRule {
    /// `w += sign(e) · μ · x`; no step when the error is exactly zero.
    SignError,
    /// `w += μ · e · x`.
    Lms,
    /// `w += μ · e · x / (‖x‖² + ε)`, energy summed over the window each time.
    Nlms,
    /// Same step as NLMS with the window energy maintained incrementally.
    FastNlms,
}

/// Running `‖x‖²` over the active tap window.
///
/// The incremental form adds the entering sample and removes the one leaving
/// the window. That is only valid while the window length stays the same, so
/// any change of tap count forces a full recompute.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnergyTracker {
    energy: f32,
    last_taps: Option<usize>,
}

impl EnergyTracker {
    pub fn reset(&mut self) {
        self.energy = 0.0;
        self.last_taps = None;
    }

    pub fn value(&self) -> f32 {
        self.energy
    }

    /// Call once per sample, after the newest sample has been written.
    pub fn track(&mut self, history: &HistoryBuffer, taps: usize) {
        if self.last_taps == Some(taps) {
            let entering = history.read(0);
            let leaving = history.read(taps);
            // Rounding can push a near-silent window slightly negative.
            self.energy = (self.energy + entering * entering - leaving * leaving).max(0.0);
        } else {
            self.energy = history.window(taps).energy();
            self.last_taps = Some(taps);
        }
    }
}

/// Applies an [`UpdateRule`] and owns whatever state the rule needs.
#[derive(Debug, Clone)]
pub(crate) struct Adapter {
    rule: UpdateRule,
    epsilon: f32,
    energy: EnergyTracker,
}

impl Adapter {
    pub fn new(rule: UpdateRule, epsilon: f32) -> Self {
        Self {
            rule,
            epsilon,
            energy: EnergyTracker::default(),
        }
    }

    pub fn reset(&mut self) {
        self.energy.reset();
    }

    /// Per-sample bookkeeping that must happen whether or not the taps move.
    pub fn observe(&mut self, history: &HistoryBuffer, taps: usize) {
        if self.rule == UpdateRule::FastNlms {
            self.energy.track(history, taps);
        }
    }

    /// Moves `coefs` (the active taps) one step along the rule's gradient.
    pub fn adapt(&self, coefs: &mut [f32], history: &HistoryBuffer, error: f32, mu: f32) {
        let window = history.window(coefs.len());
        let step = match self.rule {
            UpdateRule::SignError => {
                if error > 0.0 {
                    mu
                } else if error < 0.0 {
                    -mu
                } else {
                    return;
                }
            }
            UpdateRule::Lms => mu * error,
            UpdateRule::Nlms => mu * error / (window.energy() + self.epsilon),
            UpdateRule::FastNlms => mu * error / (self.energy.value() + self.epsilon),
        };
        window.accumulate_into(coefs, step);
    }

    #[cfg(test)]
    pub fn tracked_energy(&self) -> f32 {
        self.energy.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CursorDirection;

    fn push(history: &mut HistoryBuffer, sample: f32) {
        history.advance();
        history.write(sample);
    }

    #[test]
    fn sign_error_steps_by_mu() {
        let mut history = HistoryBuffer::new(4, CursorDirection::Forward).unwrap();
        history.write(2.0);
        let adapter = Adapter::new(UpdateRule::SignError, 1e-3);
        let mut coefs = [0.0f32; 1];

        adapter.adapt(&mut coefs, &history, 0.3, 0.01);
        assert_eq!(coefs[0], 0.02);
        adapter.adapt(&mut coefs, &history, -5.0, 0.01);
        assert_eq!(coefs[0], 0.0);
        adapter.adapt(&mut coefs, &history, 0.0, 0.01);
        assert_eq!(coefs[0], 0.0);
    }

    #[test]
    fn lms_scales_with_error() {
        let mut history = HistoryBuffer::new(4, CursorDirection::Forward).unwrap();
        history.write(1.0);
        push(&mut history, 2.0);
        let adapter = Adapter::new(UpdateRule::Lms, 1e-3);
        let mut coefs = [0.0f32; 2];
        adapter.adapt(&mut coefs, &history, 0.5, 0.1);
        assert!((coefs[0] - 0.1).abs() < 1e-7);
        assert!((coefs[1] - 0.05).abs() < 1e-7);
    }

    #[test]
    fn nlms_normalises_by_window_energy() {
        let mut history = HistoryBuffer::new(4, CursorDirection::Backward).unwrap();
        history.write(3.0);
        push(&mut history, 4.0);
        let adapter = Adapter::new(UpdateRule::Nlms, 1e-3);
        let mut coefs = [0.0f32; 2];
        adapter.adapt(&mut coefs, &history, 1.0, 1.0);
        let step = 1.0 / (25.0 + 1e-3);
        assert!((coefs[0] - step * 4.0).abs() < 1e-7);
        assert!((coefs[1] - step * 3.0).abs() < 1e-7);
    }

    #[test]
    fn epsilon_keeps_silent_reference_finite() {
        let history = HistoryBuffer::new(8, CursorDirection::Backward).unwrap();
        for rule in [UpdateRule::Nlms, UpdateRule::FastNlms] {
            let mut adapter = Adapter::new(rule, 1e-3);
            adapter.observe(&history, 8);
            let mut coefs = [0.25f32; 8];
            adapter.adapt(&mut coefs, &history, 1.0, 2.0);
            assert_eq!(coefs, [0.25f32; 8]);
        }
    }

    #[test]
    fn incremental_energy_tracks_window() {
        let mut history = HistoryBuffer::new(16, CursorDirection::Backward).unwrap();
        let mut tracker = EnergyTracker::default();
        let samples = [0.5, -0.25, 1.0, 0.75, -1.0, 0.125, 0.5, -0.5, 0.25, 1.0];
        for (i, &s) in samples.iter().enumerate() {
            if i > 0 {
                history.advance();
            }
            history.write(s);
            tracker.track(&history, 4);
            let exact = history.window(4).energy();
            assert!((tracker.value() - exact).abs() < 1e-5, "sample {i}");
        }
    }

    #[test]
    fn tap_count_change_forces_recompute() {
        let mut history = HistoryBuffer::new(16, CursorDirection::Forward).unwrap();
        let mut tracker = EnergyTracker::default();
        for s in [1.0, 2.0, 3.0, 4.0] {
            history.advance();
            history.write(s);
            tracker.track(&history, 2);
        }
        assert_eq!(tracker.value(), 25.0);

        // Growing the window to four taps without a recompute would leave
        // the old two-tap energy in place.
        history.advance();
        history.write(5.0);
        tracker.track(&history, 4);
        assert_eq!(tracker.value(), 25.0 + 16.0 + 9.0 + 4.0);

        tracker.reset();
        assert_eq!(tracker.value(), 0.0);
    }
}
