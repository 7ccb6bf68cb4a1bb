//! canary-topic — reconciliation of the Kafka canary topic.
//!
//! The [`TopicReconciler`] talks to the cluster through the
//! [`BrokerAdmin`] collaborator and makes sure the canary topic exists and
//! carries the configured entries. It is invoked periodically by its own
//! task and performs no retries of its own: every failure is returned and
//! the next cycle starts over.
//!
//! # Phases
//!
//! ```text
//! Uninitialized → Connecting → Connected ─┬─────────────────────────┬→ TopicConfiguring → Steady
//!                                         └→ TopicMissing → TopicCreating ┘
//!
//! any connected phase ── transient network error ──→ Disconnected
//! ```
//!
//! # Self-Healing
//!
//! A transient network error while describing the topic closes and drops
//! the admin connection. The next cycle reconnects before doing anything
//! else, which covers broker restarts and controller moves.

pub mod admin;
pub mod error;
pub mod metrics;
pub mod reconciler;

pub use admin::{
    AdminConnector, AdminError, AdminFuture, AdminResult, BrokerAdmin, ConfigEntry,
    PartitionMetadata, TopicMetadata, TopicSpec,
};
pub use error::{TopicError, TopicResult};
pub use metrics::{FailureCounter, MetricsSink};
pub use reconciler::{ReconcilePhase, TopicReconcileResult, TopicReconciler};
