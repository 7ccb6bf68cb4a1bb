//! Failure counters the reconciler reports to.

/// Topic-management failure counters exposed by the canary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureCounter {
    TopicCreation,
    DescribeCluster,
    DescribeTopic,
    AlterAssignments,
    AlterConfiguration,
}

impl FailureCounter {
    pub const ALL: [FailureCounter; 5] = [
        FailureCounter::TopicCreation,
        FailureCounter::DescribeCluster,
        FailureCounter::DescribeTopic,
        FailureCounter::AlterAssignments,
        FailureCounter::AlterConfiguration,
    ];

    /// Metric name without the namespace prefix.
    pub fn name(self) -> &'static str {
        match self {
            FailureCounter::TopicCreation => "topic_creation_failed_total",
            FailureCounter::DescribeCluster => "topic_describe_cluster_error_total",
            FailureCounter::DescribeTopic => "topic_describe_error_total",
            FailureCounter::AlterAssignments => "topic_alter_assignments_error_total",
            FailureCounter::AlterConfiguration => "topic_alter_configuration_error_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            FailureCounter::TopicCreation => "Total number of errors while creating the canary topic",
            FailureCounter::DescribeCluster => "Total number of errors while describing cluster",
            FailureCounter::DescribeTopic => {
                "Total number of errors while getting canary topic metadata"
            }
            FailureCounter::AlterAssignments => {
                "Total number of errors while altering partitions assignments for the canary topic"
            }
            FailureCounter::AlterConfiguration => {
                "Total number of errors while altering configuration for the canary topic"
            }
        }
    }

    /// Whether samples carry a `topic` label.
    pub fn labelled_by_topic(self) -> bool {
        !matches!(self, FailureCounter::DescribeCluster)
    }
}

/// Capability injected into the reconciler for counting failures.
pub trait MetricsSink: Send + Sync {
    /// Bump `counter`. `topic` is ignored for unlabelled counters.
    fn increment(&self, counter: FailureCounter, topic: &str);
}
