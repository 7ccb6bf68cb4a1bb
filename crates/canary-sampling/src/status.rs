//! Point-in-time delivery status for the `/status` endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::info;

use canary_core::CanaryConfig;

use crate::error::SamplingError;
use crate::percentage::delivery_percentage;
use crate::ring::SampleRing;

/// Percentage reported while there is not enough data to measure delivery.
pub const NO_DATA_PERCENTAGE: f64 = -1.0;

/// Status snapshot served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub consuming: ConsumingStatus,
}

/// Consumption side of the status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumingStatus {
    /// Span covered by the retained samples, serialized in nanoseconds.
    #[serde(serialize_with = "duration_nanos")]
    pub time_window: Duration,
    /// Delivery percentage, or [`NO_DATA_PERCENTAGE`].
    ///
    /// A measured `-1.00` (consumed total moving backwards) serializes the
    /// same as the sentinel; use [`ConsumingStatus::has_data`] to tell them
    /// apart in-process.
    pub percentage: f64,
    #[serde(skip)]
    measured: bool,
}

impl ConsumingStatus {
    pub fn measured(time_window: Duration, percentage: f64) -> Self {
        Self {
            time_window,
            percentage,
            measured: true,
        }
    }

    pub fn no_data(time_window: Duration) -> Self {
        Self {
            time_window,
            percentage: NO_DATA_PERCENTAGE,
            measured: false,
        }
    }

    /// Whether the percentage is an actual measurement.
    pub fn has_data(&self) -> bool {
        self.measured
    }
}

fn duration_nanos<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Builds [`Status`] from the two rings. Never touches the network.
#[derive(Clone)]
pub struct StatusReporter {
    check_interval: Duration,
    produced: Arc<SampleRing>,
    consumed: Arc<SampleRing>,
}

impl StatusReporter {
    pub fn new(config: &CanaryConfig, produced: Arc<SampleRing>, consumed: Arc<SampleRing>) -> Self {
        Self {
            check_interval: config.status_check_interval,
            produced,
            consumed,
        }
    }

    pub fn build_status(&self) -> Status {
        let samples = self.consumed.count() as u32;
        let time_window = self.check_interval * samples;

        let consuming = match delivery_percentage(&self.produced, &self.consumed) {
            Ok(p) => ConsumingStatus::measured(time_window, p),
            Err(SamplingError::NoDataSamples) => {
                info!(samples, "not enough samples for a delivery percentage yet");
                ConsumingStatus::no_data(time_window)
            }
        };

        Status { consuming }
    }
}
