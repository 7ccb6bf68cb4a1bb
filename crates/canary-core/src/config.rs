//! canary.toml configuration parser.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_str;
use crate::error::{ConfigError, ConfigResult};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub canary: CanaryConfig,
    pub kafka: KafkaConfig,
    pub api: ApiConfig,
}

/// What the canary state engine needs: the topic it owns and the cadence
/// of sampling and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanaryConfig {
    /// Name of the canary topic.
    pub topic: String,
    /// Partition count used when the topic has to be created.
    pub partitions: i32,
    /// Replication factor used when the topic has to be created.
    pub replication_factor: i16,
    /// How often produced/consumed totals are sampled.
    #[serde(with = "serde_str")]
    pub status_check_interval: Duration,
    /// Trailing window the delivery percentage is computed over.
    #[serde(with = "serde_str")]
    pub status_time_window: Duration,
    /// How often the topic reconciler runs.
    #[serde(with = "serde_str")]
    pub reconcile_interval: Duration,
    /// Deadline for a single reconcile attempt.
    #[serde(with = "serde_str")]
    pub reconcile_timeout: Duration,
    /// Topic configuration entries applied once after the topic exists.
    pub topic_config: BTreeMap<String, String>,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            topic: "__canary".to_string(),
            partitions: 1,
            replication_factor: 3,
            status_check_interval: Duration::from_secs(30),
            status_time_window: Duration::from_secs(150),
            reconcile_interval: Duration::from_secs(30),
            reconcile_timeout: Duration::from_secs(10),
            topic_config: BTreeMap::new(),
        }
    }
}

impl CanaryConfig {
    /// Number of sampling ticks needed to cover the status time window.
    pub fn ring_capacity(&self) -> usize {
        let interval = self.status_check_interval.as_millis().max(1);
        let window = self.status_time_window.as_millis();
        (window.div_ceil(interval) as usize).max(1)
    }
}

/// Kafka client settings for the admin, producer and consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub bootstrap_servers: String,
    pub client_id: String,
    pub consumer_group: String,
    /// How often the producer emits one record per partition.
    #[serde(with = "serde_str")]
    pub produce_interval: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "kafka-canary".to_string(),
            consumer_group: "kafka-canary-group".to_string(),
            produce_interval: Duration::from_secs(1),
        }
    }
}

/// HTTP listener for `/status` and `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the state engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let c = &self.canary;
        if c.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("canary.topic must not be empty".into()));
        }
        if c.partitions <= 0 {
            return Err(ConfigError::Invalid(format!(
                "canary.partitions must be positive, got {}",
                c.partitions
            )));
        }
        if c.replication_factor <= 0 {
            return Err(ConfigError::Invalid(format!(
                "canary.replication_factor must be positive, got {}",
                c.replication_factor
            )));
        }
        for (name, value) in [
            ("canary.status_check_interval", c.status_check_interval),
            ("canary.reconcile_interval", c.reconcile_interval),
            ("canary.reconcile_timeout", c.reconcile_timeout),
            ("kafka.produce_interval", self.kafka.produce_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
        }
        if c.status_time_window < c.status_check_interval {
            return Err(ConfigError::Invalid(
                "canary.status_time_window must be at least canary.status_check_interval".into(),
            ));
        }
        if self.kafka.bootstrap_servers.trim().is_empty() {
            return Err(ConfigError::Invalid("kafka.bootstrap_servers must not be empty".into()));
        }
        Ok(())
    }
}
