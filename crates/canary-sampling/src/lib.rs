//! canary-sampling — sliding time-window sampling for the Kafka canary.
//!
//! The producer and consumer loops bump cumulative totals in
//! [`DeliveryCounters`]. Once per status check interval the [`Sampler`]
//! appends both totals to their own [`SampleRing`]. A status request reads
//! both rings and turns the windowed deltas into a delivery percentage.
//!
//! # Architecture
//!
//! ```text
//! DeliveryCounters (atomics)
//!   └── Sampler::run() ── every check interval ──┐
//!                                                ├── produced SampleRing
//!                                                └── consumed SampleRing
//! StatusReporter::build_status()
//!   ├── consumed.count() × interval → time window
//!   └── delivery_percentage(produced, consumed) → percentage | -1
//! ```

pub mod error;
pub mod percentage;
pub mod ring;
pub mod sampler;
pub mod status;

pub use error::SamplingError;
pub use percentage::delivery_percentage;
pub use ring::{RingSnapshot, SampleRing};
pub use sampler::{DeliveryCounters, Sampler};
pub use status::{ConsumingStatus, Status, StatusReporter, NO_DATA_PERCENTAGE};
