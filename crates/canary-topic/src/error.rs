//! Reconciler error types.

use std::time::Duration;

use thiserror::Error;

use crate::admin::AdminError;

pub type TopicResult<T> = Result<T, TopicError>;

/// Why a reconcile cycle (or close) failed.
#[derive(Debug, Error)]
pub enum TopicError {
    #[error("failed to connect cluster admin: {0}")]
    Connect(#[source] AdminError),

    /// The admin connection has already been discarded.
    #[error("lost connection to cluster: {0}")]
    Transient(#[source] AdminError),

    #[error("failed to describe topic {topic}: {source}")]
    DescribeTopic {
        topic: String,
        #[source]
        source: AdminError,
    },

    #[error("failed to create topic {topic}: {source}")]
    CreateTopic {
        topic: String,
        #[source]
        source: AdminError,
    },

    #[error("failed to alter configuration of topic {topic}: {source}")]
    AlterConfiguration {
        topic: String,
        #[source]
        source: AdminError,
    },

    #[error("reconcile attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The admin connection could not be released.
    #[error("failed to close cluster admin: {0}")]
    Close(#[source] AdminError),
}

impl TopicError {
    /// Fatal errors stop the process instead of waiting for the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TopicError::Close(_))
    }
}
