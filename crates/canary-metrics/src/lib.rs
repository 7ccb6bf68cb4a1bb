//! canary-metrics — observability for the Kafka canary.
//!
//! Counts topic-management failures reported by the reconciler and renders
//! them, together with the delivery counters and the current status, in
//! Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! CanaryMetrics (MetricsSink)
//!   ├── increment() ← called by TopicReconciler on failures
//!   └── snapshot() → Vec<FailureSample>
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{CanaryMetrics, FailureSample};
pub use prometheus::{DeliverySnapshot, METRICS_NAMESPACE, render_prometheus};
