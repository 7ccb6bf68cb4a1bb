//! Topic reconciler — keeps the canary topic present and configured.
//!
//! One reconciler is owned by one task; `reconcile` takes `&mut self`, so
//! two cycles can never overlap on the same instance.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use canary_core::CanaryConfig;

use crate::admin::{AdminConnector, AdminError, BrokerAdmin, ConfigEntry, TopicSpec};
use crate::error::{TopicError, TopicResult};
use crate::metrics::{FailureCounter, MetricsSink};

/// Where the reconciler currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// No cycle has run yet.
    Uninitialized,
    /// Establishing the admin connection.
    Connecting,
    /// Admin connection held; topic state not yet confirmed this cycle.
    Connected,
    /// The topic was reported missing.
    TopicMissing,
    /// Topic creation in flight.
    TopicCreating,
    /// Applying the one-time topic configuration.
    TopicConfiguring,
    /// Topic exists and has been configured.
    Steady,
    /// No admin connection; the next cycle reconnects.
    Disconnected,
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicReconcileResult {
    /// Partition ids of the canary topic, ascending.
    pub assignments: Vec<i32>,
    /// Partition id → leader broker id.
    pub leaders: BTreeMap<i32, i32>,
    /// Producer/consumer clients should refresh cached cluster metadata.
    pub refresh_metadata: bool,
}

enum AdminConnection {
    Disconnected,
    Connected(Box<dyn BrokerAdmin>),
}

/// Ensures the canary topic exists and is configured exactly once.
pub struct TopicReconciler {
    config: CanaryConfig,
    connector: Arc<dyn AdminConnector>,
    metrics: Arc<dyn MetricsSink>,
    admin: AdminConnection,
    /// Configuration entries have been applied during this process lifetime.
    topic_initialized: bool,
    phase: ReconcilePhase,
    last_assignments: Vec<i32>,
    last_leaders: BTreeMap<i32, i32>,
}

impl TopicReconciler {
    pub fn new(
        config: CanaryConfig,
        connector: Arc<dyn AdminConnector>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            connector,
            metrics,
            admin: AdminConnection::Disconnected,
            topic_initialized: false,
            phase: ReconcilePhase::Uninitialized,
            last_assignments: Vec::new(),
            last_leaders: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.admin, AdminConnection::Connected(_))
    }

    pub fn topic_initialized(&self) -> bool {
        self.topic_initialized
    }

    /// Run one reconcile cycle.
    pub async fn reconcile(&mut self) -> TopicResult<TopicReconcileResult> {
        let topic = self.config.topic.clone();

        if !self.is_connected() {
            self.phase = ReconcilePhase::Connecting;
            match self.connector.connect().await {
                Ok(admin) => {
                    debug!(%topic, "cluster admin connected");
                    self.admin = AdminConnection::Connected(admin);
                }
                Err(e) => {
                    self.phase = ReconcilePhase::Disconnected;
                    error!(error = %e, "error creating cluster admin client");
                    return Err(TopicError::Connect(e));
                }
            }
        }
        self.phase = ReconcilePhase::Connected;

        let AdminConnection::Connected(admin) = &self.admin else {
            return Err(TopicError::Connect(AdminError::Other(
                "admin connection missing after connect".into(),
            )));
        };

        let mut created = false;
        let metadata = match admin.get_topic(&topic, false).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_transient() => {
                warn!(%topic, error = %e, "lost connection to cluster, dropping admin client");
                self.disconnect().await?;
                return Err(TopicError::Transient(e));
            }
            Err(e) => {
                if e.is_topic_not_found() {
                    self.phase = ReconcilePhase::TopicMissing;
                    let spec = TopicSpec {
                        name: topic.clone(),
                        num_partitions: self.config.partitions,
                        replication_factor: self.config.replication_factor,
                        config_entries: Vec::new(),
                    };

                    self.phase = ReconcilePhase::TopicCreating;
                    if let Err(e) = admin.create_topic(&spec).await {
                        self.metrics.increment(FailureCounter::TopicCreation, &topic);
                        error!(%topic, error = %e, "error creating the canary topic");
                        self.phase = ReconcilePhase::Connected;
                        return Err(TopicError::CreateTopic { topic, source: e });
                    }
                    info!(
                        %topic,
                        partitions = spec.num_partitions,
                        replication_factor = spec.replication_factor,
                        "canary topic created"
                    );
                    created = true;
                } else {
                    debug!(%topic, error = %e, "describe failed, describing again");
                }

                match admin.get_topic(&topic, false).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        self.metrics.increment(FailureCounter::DescribeTopic, &topic);
                        error!(%topic, error = %e, "error describing canary topic");
                        self.phase = ReconcilePhase::Connected;
                        return Err(TopicError::DescribeTopic { topic, source: e });
                    }
                }
            }
        };

        if !self.topic_initialized {
            self.phase = ReconcilePhase::TopicConfiguring;
            let entries: Vec<ConfigEntry> = self
                .config
                .topic_config
                .iter()
                .map(|(name, value)| ConfigEntry::new(name, value))
                .collect();

            if entries.is_empty() {
                debug!(%topic, "no topic configuration entries to apply");
            } else {
                match admin.update_topic_config(&topic, &entries, false).await {
                    Ok(applied) => {
                        info!(%topic, entries = applied.len(), "canary topic configuration applied");
                    }
                    Err(e) => {
                        self.metrics.increment(FailureCounter::AlterConfiguration, &topic);
                        error!(%topic, error = %e, "error altering topic configuration");
                        self.phase = ReconcilePhase::Connected;
                        return Err(TopicError::AlterConfiguration { topic, source: e });
                    }
                }
            }
            self.topic_initialized = true;
        }

        let assignments = metadata.partition_ids();
        let leaders = metadata.leaders();
        let refresh_metadata =
            created || assignments != self.last_assignments || leaders != self.last_leaders;
        if refresh_metadata {
            debug!(%topic, ?assignments, ?leaders, "canary topic metadata changed");
        }
        self.last_assignments.clone_from(&assignments);
        self.last_leaders.clone_from(&leaders);
        self.phase = ReconcilePhase::Steady;

        Ok(TopicReconcileResult {
            assignments,
            leaders,
            refresh_metadata,
        })
    }

    /// Run one cycle under a deadline. An expired attempt fails with
    /// [`TopicError::Timeout`].
    pub async fn reconcile_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> TopicResult<TopicReconcileResult> {
        let outcome = tokio::time::timeout(timeout, self.reconcile()).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    topic = %self.config.topic,
                    timeout_ms = timeout.as_millis() as u64,
                    "reconcile attempt timed out"
                );
                self.phase = if self.is_connected() {
                    ReconcilePhase::Connected
                } else {
                    ReconcilePhase::Disconnected
                };
                Err(TopicError::Timeout(timeout))
            }
        }
    }

    /// Release the admin connection if one is held. Safe to call repeatedly.
    pub async fn close(&mut self) -> TopicResult<()> {
        info!("closing topic reconciler");
        self.disconnect().await
    }

    async fn disconnect(&mut self) -> TopicResult<()> {
        let previous = std::mem::replace(&mut self.admin, AdminConnection::Disconnected);
        self.phase = ReconcilePhase::Disconnected;
        if let AdminConnection::Connected(mut admin) = previous {
            if let Err(e) = admin.close().await {
                error!(error = %e, "error closing cluster admin");
                return Err(TopicError::Close(e));
            }
        }
        Ok(())
    }

    /// Reconcile every `reconcile_interval` until shutdown, publishing the
    /// latest partition assignment. Returns early on a fatal error.
    pub async fn run(
        mut self,
        assignments: watch::Sender<Vec<i32>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> TopicResult<()> {
        let interval = self.config.reconcile_interval;
        let timeout = self.config.reconcile_timeout;
        info!(
            topic = %self.config.topic,
            interval_ms = interval.as_millis() as u64,
            "topic reconciler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_with_timeout(timeout).await {
                        Ok(result) => {
                            if result.refresh_metadata {
                                info!(partitions = ?result.assignments, "canary topic assignment updated");
                            }
                            assignments.send_replace(result.assignments);
                        }
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "topic reconciler stopping");
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(error = %e, "reconcile failed, retrying next cycle");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("topic reconciler shutting down");
                    break;
                }
            }
        }

        self.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use crate::admin::{AdminFuture, PartitionMetadata, TopicMetadata};

    /// In-memory cluster shared by every admin connection the mock
    /// connector hands out.
    #[derive(Default)]
    struct Cluster {
        topics: HashMap<String, TopicMetadata>,
        configs: HashMap<String, Vec<ConfigEntry>>,
        /// Every admin call in order.
        calls: Vec<&'static str>,
        connect_errors: VecDeque<AdminError>,
        describe_errors: VecDeque<AdminError>,
        create_errors: VecDeque<AdminError>,
        config_errors: VecDeque<AdminError>,
        close_errors: VecDeque<AdminError>,
        /// Delay applied to describe calls.
        describe_delay: Option<Duration>,
    }

    impl Cluster {
        fn count(&self, call: &str) -> usize {
            self.calls.iter().filter(|c| **c == call).count()
        }
    }

    type Shared = Arc<Mutex<Cluster>>;

    struct MockAdmin {
        cluster: Shared,
    }

    impl BrokerAdmin for MockAdmin {
        fn get_topic<'a>(
            &'a self,
            topic: &'a str,
            _include_authorized_ops: bool,
        ) -> AdminFuture<'a, TopicMetadata> {
            Box::pin(async move {
                let delay = {
                    let mut c = self.cluster.lock().unwrap();
                    c.calls.push("get_topic");
                    c.describe_delay
                };
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let mut c = self.cluster.lock().unwrap();
                if let Some(e) = c.describe_errors.pop_front() {
                    return Err(e);
                }
                c.topics
                    .get(topic)
                    .cloned()
                    .ok_or_else(|| AdminError::TopicNotFound(topic.to_string()))
            })
        }

        fn create_topic<'a>(&'a self, spec: &'a TopicSpec) -> AdminFuture<'a, ()> {
            Box::pin(async move {
                let mut c = self.cluster.lock().unwrap();
                c.calls.push("create_topic");
                if let Some(e) = c.create_errors.pop_front() {
                    return Err(e);
                }
                let partitions = (0..spec.num_partitions)
                    .map(|id| PartitionMetadata {
                        id,
                        leader: id % 3,
                        replicas: (0..spec.replication_factor as i32).collect(),
                        isr: (0..spec.replication_factor as i32).collect(),
                    })
                    .collect();
                c.topics.insert(
                    spec.name.clone(),
                    TopicMetadata {
                        name: spec.name.clone(),
                        partitions,
                    },
                );
                Ok(())
            })
        }

        fn update_topic_config<'a>(
            &'a self,
            topic: &'a str,
            entries: &'a [ConfigEntry],
            _validate_only: bool,
        ) -> AdminFuture<'a, Vec<ConfigEntry>> {
            Box::pin(async move {
                let mut c = self.cluster.lock().unwrap();
                c.calls.push("update_topic_config");
                if let Some(e) = c.config_errors.pop_front() {
                    return Err(e);
                }
                c.configs.insert(topic.to_string(), entries.to_vec());
                Ok(entries.to_vec())
            })
        }

        fn close(&mut self) -> AdminFuture<'_, ()> {
            Box::pin(async move {
                let mut c = self.cluster.lock().unwrap();
                c.calls.push("close");
                match c.close_errors.pop_front() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            })
        }
    }

    struct MockConnector {
        cluster: Shared,
    }

    impl AdminConnector for MockConnector {
        fn connect(&self) -> AdminFuture<'_, Box<dyn BrokerAdmin>> {
            Box::pin(async move {
                let mut c = self.cluster.lock().unwrap();
                c.calls.push("connect");
                if let Some(e) = c.connect_errors.pop_front() {
                    return Err(e);
                }
                Ok(Box::new(MockAdmin {
                    cluster: Arc::clone(&self.cluster),
                }) as Box<dyn BrokerAdmin>)
            })
        }
    }

    #[derive(Default)]
    struct RecordingMetrics {
        counts: Mutex<HashMap<(FailureCounter, String), u64>>,
    }

    impl RecordingMetrics {
        fn get(&self, counter: FailureCounter, topic: &str) -> u64 {
            self.counts
                .lock()
                .unwrap()
                .get(&(counter, topic.to_string()))
                .copied()
                .unwrap_or(0)
        }
    }

    impl MetricsSink for RecordingMetrics {
        fn increment(&self, counter: FailureCounter, topic: &str) {
            *self
                .counts
                .lock()
                .unwrap()
                .entry((counter, topic.to_string()))
                .or_default() += 1;
        }
    }

    fn canary_config() -> CanaryConfig {
        let mut config = CanaryConfig {
            topic: "__canary".to_string(),
            partitions: 3,
            replication_factor: 2,
            ..CanaryConfig::default()
        };
        config
            .topic_config
            .insert("retention.ms".to_string(), "600000".to_string());
        config
    }

    fn setup(config: CanaryConfig) -> (TopicReconciler, Shared, Arc<RecordingMetrics>) {
        let cluster: Shared = Arc::new(Mutex::new(Cluster::default()));
        let metrics = Arc::new(RecordingMetrics::default());
        let reconciler = TopicReconciler::new(
            config,
            Arc::new(MockConnector {
                cluster: Arc::clone(&cluster),
            }),
            metrics.clone(),
        );
        (reconciler, cluster, metrics)
    }

    fn existing_topic(cluster: &Shared, name: &str, partitions: i32) {
        let meta = TopicMetadata {
            name: name.to_string(),
            partitions: (0..partitions)
                .map(|id| PartitionMetadata {
                    id,
                    leader: 1,
                    replicas: vec![1],
                    isr: vec![1],
                })
                .collect(),
        };
        cluster.lock().unwrap().topics.insert(name.to_string(), meta);
    }

    #[tokio::test]
    async fn creates_missing_topic_then_configures_once() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        assert_eq!(reconciler.phase(), ReconcilePhase::Uninitialized);

        let result = reconciler.reconcile().await.unwrap();

        assert_eq!(result.assignments, vec![0, 1, 2]);
        assert!(result.refresh_metadata);
        assert!(reconciler.topic_initialized());
        assert_eq!(reconciler.phase(), ReconcilePhase::Steady);

        let c = cluster.lock().unwrap();
        assert_eq!(
            c.calls,
            vec!["connect", "get_topic", "create_topic", "get_topic", "update_topic_config"]
        );
        let topic = &c.topics["__canary"];
        assert_eq!(topic.partitions.len(), 3);
        assert_eq!(topic.partitions[0].replicas.len(), 2);
        assert_eq!(
            c.configs["__canary"],
            vec![ConfigEntry::new("retention.ms", "600000")]
        );
    }

    #[tokio::test]
    async fn existing_configured_topic_is_left_alone() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        existing_topic(&cluster, "__canary", 2);

        let first = reconciler.reconcile().await.unwrap();
        cluster.lock().unwrap().calls.clear();

        for _ in 0..5 {
            let result = reconciler.reconcile().await.unwrap();
            assert_eq!(result.assignments, first.assignments);
            assert_eq!(result.leaders, first.leaders);
            assert!(!result.refresh_metadata);
        }

        let c = cluster.lock().unwrap();
        assert_eq!(c.count("create_topic"), 0);
        assert_eq!(c.count("update_topic_config"), 0);
        assert_eq!(c.count("connect"), 0);
        assert_eq!(c.count("get_topic"), 5);
    }

    #[tokio::test]
    async fn configuration_applied_exactly_once_across_cycles() {
        let (mut reconciler, cluster, _) = setup(canary_config());

        for _ in 0..10 {
            reconciler.reconcile().await.unwrap();
        }

        let c = cluster.lock().unwrap();
        assert_eq!(c.count("update_topic_config"), 1);
        assert_eq!(c.count("create_topic"), 1);
        assert_eq!(c.count("connect"), 1);
    }

    #[tokio::test]
    async fn empty_topic_config_skips_alter_call() {
        let mut config = canary_config();
        config.topic_config.clear();
        let (mut reconciler, cluster, _) = setup(config);

        reconciler.reconcile().await.unwrap();

        assert!(reconciler.topic_initialized());
        assert_eq!(cluster.lock().unwrap().count("update_topic_config"), 0);
    }

    #[tokio::test]
    async fn transient_describe_error_drops_connection() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        reconciler.reconcile().await.unwrap();

        cluster
            .lock()
            .unwrap()
            .describe_errors
            .push_back(AdminError::Transient("connection reset".into()));
        let err = reconciler.reconcile().await.unwrap_err();

        assert!(matches!(err, TopicError::Transient(_)));
        assert!(!reconciler.is_connected());
        assert_eq!(reconciler.phase(), ReconcilePhase::Disconnected);
        assert_eq!(cluster.lock().unwrap().calls.last(), Some(&"close"));
    }

    #[tokio::test]
    async fn next_cycle_reconnects_before_anything_else() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        reconciler.reconcile().await.unwrap();
        cluster
            .lock()
            .unwrap()
            .describe_errors
            .push_back(AdminError::Transient("broker went away".into()));
        reconciler.reconcile().await.unwrap_err();
        cluster.lock().unwrap().calls.clear();

        reconciler.reconcile().await.unwrap();

        let c = cluster.lock().unwrap();
        assert_eq!(c.calls.first(), Some(&"connect"));
        assert_eq!(c.calls, vec!["connect", "get_topic"]);
        assert!(reconciler.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_is_returned_and_retried() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        cluster
            .lock()
            .unwrap()
            .connect_errors
            .push_back(AdminError::Transient("no brokers".into()));

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, TopicError::Connect(_)));
        assert_eq!(reconciler.phase(), ReconcilePhase::Disconnected);

        reconciler.reconcile().await.unwrap();
        assert_eq!(cluster.lock().unwrap().count("connect"), 2);
    }

    #[tokio::test]
    async fn creation_failure_is_counted_and_connection_kept() {
        let (mut reconciler, cluster, metrics) = setup(canary_config());
        cluster
            .lock()
            .unwrap()
            .create_errors
            .push_back(AdminError::Other("policy violation".into()));

        let err = reconciler.reconcile().await.unwrap_err();

        assert!(matches!(err, TopicError::CreateTopic { ref topic, .. } if topic == "__canary"));
        assert_eq!(metrics.get(FailureCounter::TopicCreation, "__canary"), 1);
        assert!(reconciler.is_connected());
        assert!(!reconciler.topic_initialized());

        // Retried on the next cycle without reconnecting.
        reconciler.reconcile().await.unwrap();
        assert_eq!(cluster.lock().unwrap().count("connect"), 1);
        assert_eq!(cluster.lock().unwrap().count("create_topic"), 2);
    }

    #[tokio::test]
    async fn describe_after_create_failure_is_counted() {
        let (mut reconciler, cluster, metrics) = setup(canary_config());
        {
            let mut c = cluster.lock().unwrap();
            c.describe_errors
                .push_back(AdminError::TopicNotFound("__canary".into()));
            c.describe_errors
                .push_back(AdminError::Other("not authorized".into()));
        }

        let err = reconciler.reconcile().await.unwrap_err();

        assert!(matches!(err, TopicError::DescribeTopic { .. }));
        assert_eq!(metrics.get(FailureCounter::DescribeTopic, "__canary"), 1);
        assert!(reconciler.is_connected());
        assert!(!reconciler.topic_initialized());
    }

    #[tokio::test]
    async fn other_first_describe_error_falls_through_to_second_describe() {
        let (mut reconciler, cluster, metrics) = setup(canary_config());
        existing_topic(&cluster, "__canary", 1);
        cluster
            .lock()
            .unwrap()
            .describe_errors
            .push_back(AdminError::Other("coordinator loading".into()));

        let result = reconciler.reconcile().await.unwrap();

        assert_eq!(result.assignments, vec![0]);
        assert_eq!(metrics.get(FailureCounter::DescribeTopic, "__canary"), 0);
        assert_eq!(cluster.lock().unwrap().count("create_topic"), 0);
    }

    #[tokio::test]
    async fn configuration_failure_leaves_latch_unset_for_retry() {
        let (mut reconciler, cluster, metrics) = setup(canary_config());
        cluster
            .lock()
            .unwrap()
            .config_errors
            .push_back(AdminError::Other("invalid config".into()));

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, TopicError::AlterConfiguration { .. }));
        assert_eq!(metrics.get(FailureCounter::AlterConfiguration, "__canary"), 1);
        assert!(!reconciler.topic_initialized());
        assert!(reconciler.is_connected());

        reconciler.reconcile().await.unwrap();
        reconciler.reconcile().await.unwrap();
        assert!(reconciler.topic_initialized());
        assert_eq!(cluster.lock().unwrap().count("update_topic_config"), 2);
    }

    #[tokio::test]
    async fn leader_change_requests_metadata_refresh() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        existing_topic(&cluster, "__canary", 2);
        reconciler.reconcile().await.unwrap();
        assert!(!reconciler.reconcile().await.unwrap().refresh_metadata);

        cluster
            .lock()
            .unwrap()
            .topics
            .get_mut("__canary")
            .unwrap()
            .partitions[1]
            .leader = 2;

        let result = reconciler.reconcile().await.unwrap();
        assert!(result.refresh_metadata);
        assert_eq!(result.leaders.get(&1), Some(&2));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        reconciler.close().await.unwrap();
        assert_eq!(cluster.lock().unwrap().count("close"), 0);

        reconciler.reconcile().await.unwrap();
        reconciler.close().await.unwrap();
        reconciler.close().await.unwrap();

        assert_eq!(cluster.lock().unwrap().count("close"), 1);
        assert_eq!(reconciler.phase(), ReconcilePhase::Disconnected);
    }

    #[tokio::test]
    async fn close_failure_is_fatal() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        reconciler.reconcile().await.unwrap();
        cluster
            .lock()
            .unwrap()
            .close_errors
            .push_back(AdminError::Other("fd leak".into()));

        let err = reconciler.close().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!reconciler.is_connected());
    }

    #[tokio::test]
    async fn close_failure_during_transient_reset_is_fatal() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        reconciler.reconcile().await.unwrap();
        {
            let mut c = cluster.lock().unwrap();
            c.describe_errors
                .push_back(AdminError::Transient("reset".into()));
            c.close_errors.push_back(AdminError::Other("stuck".into()));
        }

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, TopicError::Close(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cluster_times_out_attempt() {
        let (mut reconciler, cluster, _) = setup(canary_config());
        cluster.lock().unwrap().describe_delay = Some(Duration::from_secs(30));

        let err = reconciler
            .reconcile_with_timeout(Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, TopicError::Timeout(d) if d == Duration::from_secs(5)));
        assert!(!err.is_fatal());
        assert_eq!(reconciler.phase(), ReconcilePhase::Connected);

        cluster.lock().unwrap().describe_delay = None;
        reconciler
            .reconcile_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reconciler.phase(), ReconcilePhase::Steady);
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_assignments_and_closes_on_shutdown() {
        let (reconciler, cluster, _) = setup(canary_config());
        let (assign_tx, mut assign_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler.run(assign_tx, shutdown_rx));

        assign_rx.changed().await.unwrap();
        assert_eq!(*assign_rx.borrow(), vec![0, 1, 2]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let c = cluster.lock().unwrap();
        assert_eq!(c.calls.last(), Some(&"close"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_operational_failures() {
        let (reconciler, cluster, metrics) = setup(canary_config());
        cluster
            .lock()
            .unwrap()
            .create_errors
            .push_back(AdminError::Other("quota".into()));
        let (assign_tx, mut assign_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(reconciler.run(assign_tx, shutdown_rx));

        // First cycle fails, second (one interval later) succeeds.
        assign_rx.changed().await.unwrap();
        assert_eq!(assign_rx.borrow().len(), 3);
        assert_eq!(metrics.get(FailureCounter::TopicCreation, "__canary"), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_fatal_error() {
        let (reconciler, cluster, _) = setup(canary_config());
        existing_topic(&cluster, "__canary", 1);
        {
            let mut c = cluster.lock().unwrap();
            // First cycle cannot describe the topic; the second hits a
            // transient error and closing the admin client then fails.
            c.describe_errors.push_back(AdminError::Other("warming up".into()));
            c.describe_errors.push_back(AdminError::Other("warming up".into()));
            c.describe_errors.push_back(AdminError::Transient("reset".into()));
            c.close_errors.push_back(AdminError::Other("stuck".into()));
        }
        let (assign_tx, _assign_rx) = watch::channel(Vec::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let err = reconciler.run(assign_tx, shutdown_rx).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
