//! Error types for the echo canceller.

use thiserror::Error;

/// Result type for echo canceller operations.
pub type Result<T> = std::result::Result<T, EchoError>;

/// Errors raised by construction or by a broken call contract.
///
/// Numeric trouble during processing (silent reference, echo length changes)
/// is absorbed by the filter and never shows up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EchoError {
    /// A buffer could not be allocated at its configured size.
    #[error("failed to allocate {what} ({len} samples)")]
    Allocation { what: &'static str, len: usize },

    /// The configuration cannot produce a usable instance.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// No preset carries the requested name.
    #[error("unknown filter variant: {0}")]
    UnknownVariant(String),

    /// `process_block` was called before `activate`.
    #[error("filter has not been activated")]
    NotActivated,

    /// Input and output slices disagree in length.
    #[error("block length mismatch: reference {reference}, desired {desired}, output {output}")]
    BlockLengthMismatch {
        reference: usize,
        desired: usize,
        output: usize,
    },

    /// The static FIR filter received the wrong number of coefficients.
    #[error("expected {expected} coefficients, got {actual}")]
    CoefficientCount { expected: usize, actual: usize },
}
