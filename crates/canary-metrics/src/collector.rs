//! Failure counters, labelled by topic where the counter has a label.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

use canary_topic::{FailureCounter, MetricsSink};

/// One counter value at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSample {
    pub counter: FailureCounter,
    /// `None` for unlabelled counters.
    pub topic: Option<String>,
    pub value: u64,
}

/// Process-wide registry of failure counters, handed to the reconciler as
/// its [`MetricsSink`].
#[derive(Debug, Default)]
pub struct CanaryMetrics {
    /// (counter, topic label) → count. Unlabelled counters use `None`.
    failures: RwLock<BTreeMap<(FailureCounter, Option<String>), AtomicU64>>,
}

impl CanaryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(counter: FailureCounter, topic: &str) -> (FailureCounter, Option<String>) {
        let label = counter.labelled_by_topic().then(|| topic.to_string());
        (counter, label)
    }

    /// Current value of a counter, 0 if never incremented.
    pub fn get(&self, counter: FailureCounter, topic: &str) -> u64 {
        let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
        failures
            .get(&Self::key(counter, topic))
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// All counters that have been incremented at least once, ordered by
    /// counter then topic.
    pub fn snapshot(&self) -> Vec<FailureSample> {
        let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
        failures
            .iter()
            .map(|((counter, topic), value)| FailureSample {
                counter: *counter,
                topic: topic.clone(),
                value: value.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl MetricsSink for CanaryMetrics {
    fn increment(&self, counter: FailureCounter, topic: &str) {
        let key = Self::key(counter, topic);
        {
            let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
            if let Some(value) = failures.get(&key) {
                value.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let mut failures = self.failures.write().unwrap_or_else(|e| e.into_inner());
        failures
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        debug!(counter = counter.name(), %topic, "failure counter registered");
    }
}
