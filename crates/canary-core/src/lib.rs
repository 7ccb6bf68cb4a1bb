//! canary-core — configuration shared by every canary subsystem.
//!
//! The daemon reads a single `canary.toml` into [`DaemonConfig`]. The
//! `[canary]` table is what the state engine consumes: topic name,
//! partition/replication targets, topic configuration entries and the
//! sampling/reconcile cadence. Everything is immutable once loaded.

pub mod config;
pub mod duration;
pub mod error;

pub use config::{ApiConfig, CanaryConfig, DaemonConfig, KafkaConfig};
pub use duration::{format_duration, parse_duration};
pub use error::{ConfigError, ConfigResult};
