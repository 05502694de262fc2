//! The adaptive echo canceller instance.

use tracing::debug;

use crate::config::FilterConfig;
use crate::controls::{Controls, Resolved};
use crate::dtd::Detector;
use crate::error::{EchoError, Result};
use crate::history::HistoryBuffer;
use crate::predictor::Coefficients;
use crate::update::Adapter;

/// Lifecycle position of an [`EchoCanceller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Buffers exist but have not been cleared for processing.
    Uninitialized,
    /// Freshly reset; no block processed since.
    Activated,
    /// At least one block processed since the last activation.
    Running,
}

/// Per-block adaptation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub samples: usize,
    /// Samples on which the taps were updated.
    pub adapted: usize,
    /// Samples on which the detector reported double talk.
    pub double_talk: usize,
}

/// Adaptive FIR echo canceller.
///
/// Every buffer is allocated by [`EchoCanceller::new`] at the configured
/// maximum size; processing never allocates.
#[derive(Debug)]
pub struct EchoCanceller {
    config: FilterConfig,
    history: HistoryBuffer,
    coefs: Coefficients,
    detector: Detector,
    adapter: Adapter,
    state: FilterState,
}

impl EchoCanceller {
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;

        let history = HistoryBuffer::new(config.history_len()?, config.direction)?;
        let coefs = Coefficients::zeroed(config.max_echo_samples())?;
        let detector = Detector::new(config.detector, config.max_dtd_samples())?;
        let adapter = Adapter::new(config.rule, config.epsilon);

        debug!(
            sample_rate = config.sample_rate,
            max_taps = coefs.capacity(),
            history = history.capacity(),
            rule = ?config.rule,
            detector = ?config.detector,
            "echo canceller allocated"
        );

        Ok(Self {
            config,
            history,
            coefs,
            detector,
            adapter,
            state: FilterState::Uninitialized,
        })
    }

    /// Clears history, taps and detector statistics. Valid at any time; on a
    /// running instance it is a hard reset.
    pub fn activate(&mut self) {
        self.history.clear();
        self.coefs.reset(self.config.identity_start);
        self.detector.reset();
        self.adapter.reset();
        self.state = FilterState::Activated;
        debug!("echo canceller activated");
    }

    /// Cancels echo from one block.
    ///
    /// `reference` is the far-end signal x(n), `desired` the microphone d(n).
    /// The residual e(n) is written to `output` for every sample, whatever the
    /// detector decides.
    pub fn process_block(
        &mut self,
        reference: &[f32],
        desired: &[f32],
        output: &mut [f32],
        controls: &Controls,
    ) -> Result<BlockStats> {
        if self.state == FilterState::Uninitialized {
            return Err(EchoError::NotActivated);
        }
        if reference.len() != desired.len() || desired.len() != output.len() {
            return Err(EchoError::BlockLengthMismatch {
                reference: reference.len(),
                desired: desired.len(),
                output: output.len(),
            });
        }

        let resolved = Resolved::new(controls, &self.config);
        let taps = resolved.taps;
        let gate_magnitude = self.detector.gates_on_magnitude();
        let mut stats = BlockStats {
            samples: output.len(),
            ..BlockStats::default()
        };

        for ((&x, &d), out) in reference.iter().zip(desired).zip(output.iter_mut()) {
            self.history.write(x);

            let error = d - self.coefs.predict(&self.history, taps);
            *out = error;

            self.adapter.observe(&self.history, taps);
            let permitted = self
                .detector
                .permits(&self.history, self.coefs.as_slice(), d, &resolved);
            let significant = !gate_magnitude || error.abs() > resolved.set_threshold;

            if !permitted {
                stats.double_talk += 1;
            } else if significant && taps > 0 {
                self.adapter.adapt(
                    self.coefs.active_mut(taps),
                    &self.history,
                    error,
                    resolved.mu,
                );
                stats.adapted += 1;
            }

            self.history.advance();
        }

        self.state = FilterState::Running;
        Ok(stats)
    }

    /// Number of taps the given controls select for this instance.
    pub fn active_taps(&self, controls: &Controls) -> usize {
        Resolved::new(controls, &self.config).taps
    }

    /// The full coefficient vector, including taps beyond the active length.
    pub fn coefficients(&self) -> &[f32] {
        self.coefs.as_slice()
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Tears the instance down. Consuming `self` rules out a second release.
    pub fn release(self) {
        debug!(max_taps = self.coefs.capacity(), "echo canceller released");
    }

    #[cfg(test)]
    pub(crate) fn tracked_energy(&self) -> f32 {
        self.adapter.tracked_energy()
    }
}
