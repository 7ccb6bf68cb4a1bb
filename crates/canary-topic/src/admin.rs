//! Broker admin collaborator.
//!
//! The reconciler only needs four admin calls. They are expressed as
//! object-safe traits returning boxed futures so the Kafka client can be
//! swapped for an in-memory double in tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Result type alias for admin calls.
pub type AdminResult<T> = Result<T, AdminError>;

/// Boxed future returned by every admin call.
pub type AdminFuture<'a, T> = Pin<Box<dyn Future<Output = AdminResult<T>> + Send + 'a>>;

/// Admin call failures, classified the way the reconciler reacts to them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    /// The requested topic does not exist.
    #[error("topic does not exist: {0}")]
    TopicNotFound(String),

    /// Connectivity failure expected to clear after reconnecting.
    #[error("transient network error: {0}")]
    Transient(String),

    #[error("{0}")]
    Other(String),
}

impl AdminError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdminError::Transient(_))
    }

    pub fn is_topic_not_found(&self) -> bool {
        matches!(self, AdminError::TopicNotFound(_))
    }
}

/// A single topic configuration key/value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Topic creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub config_entries: Vec<ConfigEntry>,
}

/// Metadata for one partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub id: i32,
    /// Broker id of the partition leader.
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

/// Metadata for a topic as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    pub partitions: Vec<PartitionMetadata>,
}

impl TopicMetadata {
    /// Partition ids in ascending order.
    pub fn partition_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.partitions.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Partition id → leader broker id.
    pub fn leaders(&self) -> BTreeMap<i32, i32> {
        self.partitions.iter().map(|p| (p.id, p.leader)).collect()
    }
}

/// An open admin connection to the cluster.
pub trait BrokerAdmin: Send + Sync {
    /// Describe a topic. Fails with [`AdminError::TopicNotFound`] when it
    /// does not exist.
    fn get_topic<'a>(
        &'a self,
        topic: &'a str,
        include_authorized_ops: bool,
    ) -> AdminFuture<'a, TopicMetadata>;

    fn create_topic<'a>(&'a self, spec: &'a TopicSpec) -> AdminFuture<'a, ()>;

    /// Overwrite the topic configuration with `entries`. Returns the entries
    /// the broker accepted.
    fn update_topic_config<'a>(
        &'a self,
        topic: &'a str,
        entries: &'a [ConfigEntry],
        validate_only: bool,
    ) -> AdminFuture<'a, Vec<ConfigEntry>>;

    /// Release the connection.
    fn close(&mut self) -> AdminFuture<'_, ()>;
}

/// Opens admin connections.
pub trait AdminConnector: Send + Sync {
    fn connect(&self) -> AdminFuture<'_, Box<dyn BrokerAdmin>>;
}
