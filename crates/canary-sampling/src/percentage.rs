//! Delivery percentage over the produced/consumed rings.

use tracing::{debug, warn};

use crate::error::SamplingError;
use crate::ring::SampleRing;

/// Percentage of records produced inside the window that were consumed
/// inside the window, rounded to two decimal digits.
///
/// Fails with [`SamplingError::NoDataSamples`] before the first produced
/// sample or when nothing was produced in the window. Values above 100 mean
/// the consumer caught up on older backlog. Negative values only come from
/// non-monotonic counters; they are logged and returned unchanged.
pub fn delivery_percentage(
    produced: &SampleRing,
    consumed: &SampleRing,
) -> Result<f64, SamplingError> {
    let produced = produced.snapshot();
    if produced.is_empty() {
        return Err(SamplingError::NoDataSamples);
    }
    let consumed = consumed.snapshot();

    let produced_delta = produced.delta();
    let consumed_delta = consumed.delta();
    if produced_delta == 0 {
        return Err(SamplingError::NoDataSamples);
    }

    let percentage = round2(consumed_delta as f64 * 100.0 / produced_delta as f64);
    if percentage < 0.0 {
        warn!(
            produced_delta,
            consumed_delta, percentage, "negative delivery percentage, counters went backwards"
        );
    } else {
        debug!(produced_delta, consumed_delta, percentage, "delivery percentage");
    }
    Ok(percentage)
}

/// Round half away from zero to two decimal digits.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
