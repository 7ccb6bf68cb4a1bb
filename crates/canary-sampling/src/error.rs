//! Sampling error types.

use thiserror::Error;

/// Errors produced while deriving status from the sample rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SamplingError {
    /// Nothing has been sampled yet, or nothing was produced in the window.
    #[error("no data samples available")]
    NoDataSamples,
}
