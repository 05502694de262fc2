//! Adaptive FIR echo cancellation.
//!
//! An [`EchoCanceller`] estimates the echo path between a reference signal
//! x(n) and a microphone signal d(n) and emits the residual
//! `e(n) = d(n) - ŵ·x(n)`. Adaptation follows one [`UpdateRule`] and is gated
//! by one double-talk detector; both are fixed per instance through a
//! [`FilterConfig`], usually built from a named [`Variant`].
//!
//! ```
//! use echo_adapt::{Controls, EchoCanceller, FilterConfig, Variant};
//!
//! let config = FilterConfig::preset(Variant::FastNlmsNcr, 16_000).with_max_echo_ms(100.0);
//! let mut canceller = EchoCanceller::new(config)?;
//! canceller.activate();
//!
//! let controls = Variant::FastNlmsNcr.default_controls();
//! let reference = [0.0f32; 160];
//! let mic = [0.0f32; 160];
//! let mut residual = [0.0f32; 160];
//! canceller.process_block(&reference, &mic, &mut residual, &controls)?;
//! # Ok::<(), echo_adapt::EchoError>(())
//! ```

pub mod canceller;
pub mod config;
pub mod controls;
pub mod dtd;
pub mod error;
pub mod fir;
pub mod history;
pub mod predictor;
pub mod update;

pub use canceller::{BlockStats, EchoCanceller, FilterState};
pub use config::{DEFAULT_EPSILON, FilterConfig, Variant};
pub use controls::{Bounds, ControlLimits, Controls, ThresholdUnit};
pub use dtd::{DetectorKind, NcrComparison};
pub use error::{EchoError, Result};
pub use fir::{DEFAULT_FIR_TAPS, StaticFir};
pub use history::{CursorDirection, HistoryBuffer, Window};
pub use predictor::{Coefficients, db_to_linear, linear_to_db, ms_to_samples};
pub use update::UpdateRule;
