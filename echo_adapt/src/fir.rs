//! Fixed-length FIR filter with caller-supplied taps.
//!
//! Shares the circular history with the adaptive canceller but never adapts:
//! the taps arrive with every block.

use crate::error::{EchoError, Result};
use crate::history::{CursorDirection, HistoryBuffer, alloc_zeroed};

pub const DEFAULT_FIR_TAPS: usize = 16;

#[derive(Debug, Clone)]
pub struct StaticFir {
    history: HistoryBuffer,
    taps: Vec<f32>,
}

impl StaticFir {
    pub fn new(taps: usize) -> Result<Self> {
        if taps == 0 {
            return Err(EchoError::InvalidConfig("FIR filter needs at least one tap"));
        }
        Ok(Self {
            history: HistoryBuffer::new(taps, CursorDirection::Forward)?,
            taps: alloc_zeroed("FIR taps", taps)?,
        })
    }

    pub fn taps(&self) -> usize {
        self.taps.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.taps.fill(0.0);
    }

    /// Filters `input` into `output` using `coefs`, each clamped to `[-1, 1]`.
    pub fn process_block(
        &mut self,
        coefs: &[f32],
        input: &[f32],
        output: &mut [f32],
    ) -> Result<()> {
        if coefs.len() != self.taps.len() {
            return Err(EchoError::CoefficientCount {
                expected: self.taps.len(),
                actual: coefs.len(),
            });
        }
        if input.len() != output.len() {
            return Err(EchoError::BlockLengthMismatch {
                reference: input.len(),
                desired: input.len(),
                output: output.len(),
            });
        }

        for (tap, &c) in self.taps.iter_mut().zip(coefs) {
            *tap = if c.is_nan() { 0.0 } else { c.clamp(-1.0, 1.0) };
        }

        let len = self.taps.len();
        for (&x, out) in input.iter().zip(output.iter_mut()) {
            self.history.write(x);
            *out = self.history.window(len).dot(&self.taps);
            self.history.advance();
        }
        Ok(())
    }
}
