//! Circular sample history with power-of-two masking.
//!
//! Samples are stored twice, at `cursor` and `cursor + capacity`, so the most
//! recent `len <= capacity` samples are always reachable as one contiguous
//! slice. Prediction and update loops therefore never branch on wraparound.

use crate::error::{EchoError, Result};

/// Direction the write cursor moves after each sample.
///
/// Both directions hold the same history; they only differ in physical layout.
/// A backward cursor keeps the newest sample at the lowest address of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDirection {
    #[default]
    Forward,
    Backward,
}

/// Allocates a zeroed sample buffer, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed(what: &'static str, len: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| EchoError::Allocation { what, len })?;
    buf.resize(len, 0.0);
    Ok(buf)
}

/// Fixed-capacity circular buffer of past reference samples.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    data: Vec<f32>,
    mask: usize,
    cursor: usize,
    direction: CursorDirection,
}

impl HistoryBuffer {
    /// Creates a buffer able to hold at least `min_len` samples.
    ///
    /// The capacity is rounded up to the next power of two.
    pub fn new(min_len: usize, direction: CursorDirection) -> Result<Self> {
        let capacity = min_len
            .max(1)
            .checked_next_power_of_two()
            .ok_or(EchoError::InvalidConfig("history length overflows usize"))?;
        let len = capacity
            .checked_mul(2)
            .ok_or(EchoError::InvalidConfig("history length overflows usize"))?;

        Ok(Self {
            data: alloc_zeroed("history buffer", len)?,
            mask: capacity - 1,
            cursor: 0,
            direction,
        })
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    /// Stores `sample` at the cursor. It becomes `read(0)` until the next advance.
    pub fn write(&mut self, sample: f32) {
        let capacity = self.capacity();
        self.data[self.cursor] = sample;
        self.data[self.cursor + capacity] = sample;
    }

    /// Returns the sample written `offset` steps ago.
    ///
    /// Offsets at or beyond the capacity alias newer samples.
    pub fn read(&self, offset: usize) -> f32 {
        let idx = match self.direction {
            CursorDirection::Forward => self.cursor.wrapping_sub(offset),
            CursorDirection::Backward => self.cursor.wrapping_add(offset),
        };
        self.data[idx & self.mask]
    }

    /// Moves the cursor one slot so the next write lands on the oldest sample.
    pub fn advance(&mut self) {
        let next = match self.direction {
            CursorDirection::Forward => self.cursor.wrapping_add(1),
            CursorDirection::Backward => self.cursor.wrapping_sub(1),
        };
        self.cursor = next & self.mask;
    }

    /// Contiguous view of the latest `len` samples, clamped to the capacity.
    pub fn window(&self, len: usize) -> Window<'_> {
        let len = len.min(self.capacity());
        match self.direction {
            CursorDirection::Backward => Window {
                samples: &self.data[self.cursor..self.cursor + len],
                newest_first: true,
            },
            CursorDirection::Forward => {
                let end = self.cursor + self.capacity() + 1;
                Window {
                    samples: &self.data[end - len..end],
                    newest_first: false,
                }
            }
        }
    }

    /// Zeroes every sample and rewinds the cursor.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.cursor = 0;
    }
}

/// The latest samples of a [`HistoryBuffer`], indexed by age.
///
/// `get(0)` is the newest sample. Every reduction walks the samples newest
/// first regardless of physical layout, so results do not depend on the
/// cursor direction.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    samples: &'a [f32],
    newest_first: bool,
}

impl Window<'_> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample written `age` steps ago.
    pub fn get(&self, age: usize) -> f32 {
        if self.newest_first {
            self.samples[age]
        } else {
            self.samples[self.samples.len() - 1 - age]
        }
    }

    /// `Σ coefs[k] · x(n-k)` over the shorter of the two.
    pub fn dot(&self, coefs: &[f32]) -> f32 {
        if self.newest_first {
            coefs
                .iter()
                .zip(self.samples)
                .fold(0.0, |acc, (c, x)| acc + c * x)
        } else {
            coefs
                .iter()
                .zip(self.samples.iter().rev())
                .fold(0.0, |acc, (c, x)| acc + c * x)
        }
    }

    /// `coefs[k] += scale · x(n-k)`.
    pub fn accumulate_into(&self, coefs: &mut [f32], scale: f32) {
        if self.newest_first {
            for (c, x) in coefs.iter_mut().zip(self.samples) {
                *c += scale * x;
            }
        } else {
            for (c, x) in coefs.iter_mut().zip(self.samples.iter().rev()) {
                *c += scale * x;
            }
        }
    }

    /// `acc[k] = decay · acc[k] + gain · x(n-k)`, the exponential smoother used
    /// for cross-correlation tracking.
    pub fn smooth_into(&self, acc: &mut [f32], decay: f32, gain: f32) {
        if self.newest_first {
            for (a, x) in acc.iter_mut().zip(self.samples) {
                *a = decay * *a + gain * x;
            }
        } else {
            for (a, x) in acc.iter_mut().zip(self.samples.iter().rev()) {
                *a = decay * *a + gain * x;
            }
        }
    }

    /// Sum of squares over the window.
    pub fn energy(&self) -> f32 {
        if self.newest_first {
            self.samples.iter().fold(0.0, |acc, x| acc + x * x)
        } else {
            self.samples.iter().rev().fold(0.0, |acc, x| acc + x * x)
        }
    }

    /// Largest absolute sample in the window.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, x| acc.max(x.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filled(direction: CursorDirection, samples: &[f32], min_len: usize) -> HistoryBuffer {
        let mut history = HistoryBuffer::new(min_len, direction).unwrap();
        for &s in samples {
            history.write(s);
            history.advance();
        }
        history
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let capacity = |min_len, direction| {
            HistoryBuffer::new(min_len, direction)
                .unwrap()
                .capacity()
        };
        assert_eq!(capacity(400, CursorDirection::Forward), 512);
        assert_eq!(capacity(512, CursorDirection::Forward), 512);
        assert_eq!(capacity(0, CursorDirection::Backward), 1);
    }

    #[test]
    fn oversized_history_is_rejected() {
        let err = HistoryBuffer::new(usize::MAX, CursorDirection::Forward).unwrap_err();
        assert!(matches!(err, EchoError::InvalidConfig(_)));
    }

    #[test]
    fn read_zero_returns_latest_write() {
        for direction in [CursorDirection::Forward, CursorDirection::Backward] {
            let mut history = HistoryBuffer::new(8, direction).unwrap();
            history.write(0.25);
            assert_eq!(history.read(0), 0.25);
            history.advance();
            history.write(-0.5);
            assert_eq!(history.read(0), -0.5);
            assert_eq!(history.read(1), 0.25);
        }
    }

    #[test]
    fn window_matches_read_in_both_directions() {
        let samples: Vec<f32> = (0..37).map(|i| i as f32).collect();
        for direction in [CursorDirection::Forward, CursorDirection::Backward] {
            let mut history = filled(direction, &samples, 16);
            history.write(100.0);
            let window = history.window(16);
            assert_eq!(window.len(), 16);
            for age in 0..16 {
                assert_eq!(window.get(age), history.read(age), "{direction:?} age {age}");
            }
            assert_eq!(window.get(0), 100.0);
            assert_eq!(window.get(1), 36.0);
        }
    }

    #[test]
    fn reductions_do_not_depend_on_direction() {
        let samples: Vec<f32> = (0..50).map(|i| ((i * 7) % 11) as f32 * 0.1 - 0.5).collect();
        let coefs: Vec<f32> = (0..12).map(|i| 1.0 / (i as f32 + 1.0)).collect();
        let mut fwd = filled(CursorDirection::Forward, &samples, 16);
        let mut bwd = filled(CursorDirection::Backward, &samples, 16);
        fwd.write(0.3);
        bwd.write(0.3);

        let (wf, wb) = (fwd.window(12), bwd.window(12));
        assert_eq!(wf.dot(&coefs).to_bits(), wb.dot(&coefs).to_bits());
        assert_eq!(wf.energy().to_bits(), wb.energy().to_bits());
        assert_eq!(wf.peak(), wb.peak());

        let mut acc_f = coefs.clone();
        let mut acc_b = coefs.clone();
        wf.accumulate_into(&mut acc_f, 0.01);
        wb.accumulate_into(&mut acc_b, 0.01);
        assert_eq!(acc_f, acc_b);
    }

    #[test]
    fn clear_zeroes_history() {
        let mut history = filled(CursorDirection::Backward, &[1.0, 2.0, 3.0], 4);
        history.clear();
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.window(4).energy(), 0.0);
    }

    proptest! {
        #[test]
        fn mask_equals_modulo(shift in 0u32..16, i in any::<usize>()) {
            let capacity = 1usize << shift;
            prop_assert_eq!(i & (capacity - 1), i % capacity);
        }

        #[test]
        fn reads_survive_wraparound(
            samples in prop::collection::vec(-1.0f32..1.0, 1..300),
            backward in any::<bool>(),
        ) {
            let direction = if backward {
                CursorDirection::Backward
            } else {
                CursorDirection::Forward
            };
            let mut history = HistoryBuffer::new(32, direction).unwrap();
            for &s in &samples {
                history.write(s);
                history.advance();
            }
            // After advancing, offset 1 is the last sample written.
            let capacity = history.capacity();
            for age in 0..samples.len().min(capacity - 1) {
                prop_assert_eq!(history.read(age + 1), samples[samples.len() - 1 - age]);
            }
        }
    }
}
