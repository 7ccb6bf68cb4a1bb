//! librdkafka-backed cluster access: the admin connector used by the
//! reconciler plus the producer and consumer loops that drive the
//! delivery counters.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rdkafka::ClientConfig;
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, NewTopic, ResourceSpecifier, TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use canary_core::KafkaConfig;
use canary_sampling::DeliveryCounters;
use canary_topic::{
    AdminConnector, AdminError, AdminFuture, AdminResult, BrokerAdmin, ConfigEntry,
    PartitionMetadata, TopicMetadata, TopicSpec,
};

type Admin = AdminClient<DefaultClientContext>;

fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("client.id", &config.client_id)
        // Metadata requests must not create the canary topic with broker
        // defaults; the reconciler creates it.
        .set("allow.auto.create.topics", "false");
    client
}

/// Map an rdkafka error code onto the reconciler's error classes.
fn classify_code(code: RDKafkaErrorCode, message: String) -> AdminError {
    match code {
        RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
            AdminError::TopicNotFound(message)
        }
        RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::OperationTimedOut
        | RDKafkaErrorCode::RequestTimedOut
        | RDKafkaErrorCode::NetworkException
        | RDKafkaErrorCode::BrokerNotAvailable
        | RDKafkaErrorCode::LeaderNotAvailable
        | RDKafkaErrorCode::NotController => AdminError::Transient(message),
        _ => AdminError::Other(message),
    }
}

fn classify(err: KafkaError) -> AdminError {
    match err.rdkafka_error_code() {
        Some(code) => classify_code(code, err.to_string()),
        None => AdminError::Other(err.to_string()),
    }
}

/// Opens [`KafkaAdmin`] connections.
pub struct KafkaConnector {
    config: KafkaConfig,
    request_timeout: Duration,
}

impl KafkaConnector {
    pub fn new(config: KafkaConfig, request_timeout: Duration) -> Self {
        Self {
            config,
            request_timeout,
        }
    }
}

impl AdminConnector for KafkaConnector {
    fn connect(&self) -> AdminFuture<'_, Box<dyn BrokerAdmin>> {
        Box::pin(async move {
            let client: Admin = client_config(&self.config).create().map_err(classify)?;
            info!(
                bootstrap_servers = %self.config.bootstrap_servers,
                "cluster admin connected"
            );
            Ok(Box::new(KafkaAdmin {
                client: Some(Arc::new(client)),
                timeout: self.request_timeout,
            }) as Box<dyn BrokerAdmin>)
        })
    }
}

/// Admin connection over an rdkafka [`AdminClient`].
pub struct KafkaAdmin {
    client: Option<Arc<Admin>>,
    timeout: Duration,
}

impl KafkaAdmin {
    fn client(&self) -> AdminResult<Arc<Admin>> {
        self.client
            .clone()
            .ok_or_else(|| AdminError::Other("admin client closed".into()))
    }

    fn options(&self, validate_only: bool) -> AdminOptions {
        AdminOptions::new()
            .request_timeout(Some(self.timeout))
            .operation_timeout(Some(self.timeout))
            .validate_only(validate_only)
    }
}

impl BrokerAdmin for KafkaAdmin {
    fn get_topic<'a>(
        &'a self,
        topic: &'a str,
        _include_authorized_ops: bool,
    ) -> AdminFuture<'a, TopicMetadata> {
        Box::pin(async move {
            let client = self.client()?;
            let name = topic.to_string();
            let timeout = self.timeout;

            // Metadata fetches block the calling thread.
            tokio::task::spawn_blocking(move || {
                let metadata = client
                    .inner()
                    .fetch_metadata(Some(&name), timeout)
                    .map_err(classify)?;
                let found = metadata
                    .topics()
                    .iter()
                    .find(|t| t.name() == name)
                    .ok_or_else(|| AdminError::TopicNotFound(name.clone()))?;
                if let Some(err) = found.error() {
                    let code = RDKafkaErrorCode::from(err);
                    return Err(classify_code(code, format!("{name}: {code}")));
                }
                Ok(TopicMetadata {
                    name: name.clone(),
                    partitions: found
                        .partitions()
                        .iter()
                        .map(|p| PartitionMetadata {
                            id: p.id(),
                            leader: p.leader(),
                            replicas: p.replicas().to_vec(),
                            isr: p.isr().to_vec(),
                        })
                        .collect(),
                })
            })
            .await
            .map_err(|e| AdminError::Other(format!("metadata task failed: {e}")))?
        })
    }

    fn create_topic<'a>(&'a self, spec: &'a TopicSpec) -> AdminFuture<'a, ()> {
        Box::pin(async move {
            let client = self.client()?;
            let replication = TopicReplication::Fixed(i32::from(spec.replication_factor));
            let new_topic = spec.config_entries.iter().fold(
                NewTopic::new(&spec.name, spec.num_partitions, replication),
                |topic, entry| topic.set(&entry.name, &entry.value),
            );

            let results = client
                .create_topics(&[new_topic], &self.options(false))
                .await
                .map_err(classify)?;
            for result in results {
                if let Err((topic, code)) = result {
                    return Err(classify_code(code, format!("{topic}: {code}")));
                }
            }
            Ok(())
        })
    }

    fn update_topic_config<'a>(
        &'a self,
        topic: &'a str,
        entries: &'a [ConfigEntry],
        validate_only: bool,
    ) -> AdminFuture<'a, Vec<ConfigEntry>> {
        Box::pin(async move {
            let client = self.client()?;
            let alter = entries.iter().fold(
                AlterConfig::new(ResourceSpecifier::Topic(topic)),
                |alter, entry| alter.set(&entry.name, &entry.value),
            );

            let results = client
                .alter_configs(&[alter], &self.options(validate_only))
                .await
                .map_err(classify)?;
            for result in results {
                if let Err((_, code)) = result {
                    return Err(classify_code(code, format!("{topic}: {code}")));
                }
            }
            Ok(entries.to_vec())
        })
    }

    fn close(&mut self) -> AdminFuture<'_, ()> {
        Box::pin(async move {
            if self.client.take().is_some() {
                debug!("cluster admin closed");
            }
            Ok(())
        })
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Canary record body.
fn canary_payload(producer_id: &str, message_id: u64) -> String {
    serde_json::json!({
        "producerId": producer_id,
        "messageId": message_id,
        "timestamp": epoch_millis() as u64,
    })
    .to_string()
}

/// Send one record to every assigned partition per `produce_interval`,
/// counting each acknowledged record.
pub async fn run_producer(
    config: KafkaConfig,
    topic: String,
    counters: Arc<DeliveryCounters>,
    assignments: watch::Receiver<Vec<i32>>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut client = client_config(&config);
    client.set("acks", "all");
    let producer: FutureProducer = client.create()?;

    let mut ticker = tokio::time::interval(config.produce_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut message_id: u64 = 0;
    info!(%topic, "canary producer started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let partitions = assignments.borrow().clone();
                for partition in partitions {
                    message_id += 1;
                    let key = partition.to_string();
                    let payload = canary_payload(&config.client_id, message_id);
                    let record = FutureRecord::to(&topic)
                        .partition(partition)
                        .key(&key)
                        .payload(&payload);
                    match producer.send(record, config.produce_interval).await {
                        Ok(_) => counters.record_produced(1),
                        Err((e, _)) => warn!(partition, error = %e, "failed to produce canary record"),
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("canary producer shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Consume the canary topic, counting every record received.
pub async fn run_consumer(
    config: KafkaConfig,
    topic: String,
    counters: Arc<DeliveryCounters>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut client = client_config(&config);
    client
        .set("group.id", &config.consumer_group)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "latest");
    let consumer: StreamConsumer = client.create()?;
    consumer.subscribe(&[topic.as_str()])?;
    info!(%topic, group = %config.consumer_group, "canary consumer started");

    loop {
        tokio::select! {
            received = consumer.recv() => match received {
                Ok(_) => counters.record_consumed(1),
                Err(e) => warn!(error = %e, "failed to consume canary record"),
            },
            _ = shutdown.changed() => {
                info!("canary consumer shutting down");
                break;
            }
        }
    }
    Ok(())
}
