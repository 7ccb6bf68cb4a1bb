//! canaryd — the Kafka canary daemon.
//!
//! Assembles the canary subsystems into one process:
//! - Topic reconciler (periodic, single task)
//! - Delivery sampler feeding the produced/consumed rings
//! - HTTP API (`/status`, `/metrics`)
//! - Kafka producer/consumer loops (`kafka` feature)

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod logging;
pub mod service;

pub use logging::{LogFormat, init_tracing};
pub use service::{CanaryService, RunningCanary};
