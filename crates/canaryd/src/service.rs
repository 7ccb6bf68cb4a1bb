//! Wires the canary subsystems together and owns their lifetimes.
//!
//! ```text
//!   CanaryService::new ──▶ start() ──▶ RunningCanary ──▶ serve(listener, signal)
//!                              │
//!                              ├── sampler task      (status_check_interval)
//!                              ├── reconciler task   (reconcile_interval)
//!                              └── workers           (producer / consumer)
//! ```
//!
//! Shutdown is driven by one `watch` channel. It fires on the external
//! signal, when the reconciler stops with a fatal error, or when a worker
//! exits with an error; `serve` then returns that error.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use canary_api::{ApiState, build_router};
use canary_core::CanaryConfig;
use canary_metrics::CanaryMetrics;
use canary_sampling::{DeliveryCounters, SampleRing, Sampler, StatusReporter};
use canary_topic::{AdminConnector, TopicReconciler, TopicResult};

/// Canary state before any task is spawned.
pub struct CanaryService {
    config: CanaryConfig,
    connector: Arc<dyn AdminConnector>,
    counters: Arc<DeliveryCounters>,
    metrics: Arc<CanaryMetrics>,
    produced: Arc<SampleRing>,
    consumed: Arc<SampleRing>,
}

impl CanaryService {
    pub fn new(config: CanaryConfig, connector: Arc<dyn AdminConnector>) -> Self {
        let capacity = config.ring_capacity();
        Self {
            config,
            connector,
            counters: Arc::new(DeliveryCounters::new()),
            metrics: Arc::new(CanaryMetrics::new()),
            produced: Arc::new(SampleRing::new(capacity)),
            consumed: Arc::new(SampleRing::new(capacity)),
        }
    }

    pub fn config(&self) -> &CanaryConfig {
        &self.config
    }

    pub fn counters(&self) -> Arc<DeliveryCounters> {
        Arc::clone(&self.counters)
    }

    pub fn metrics(&self) -> Arc<CanaryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// API router over this service's rings and counters.
    pub fn router(&self) -> Router {
        build_router(ApiState {
            status: StatusReporter::new(
                &self.config,
                Arc::clone(&self.produced),
                Arc::clone(&self.consumed),
            ),
            metrics: Arc::clone(&self.metrics),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Spawn the sampler and reconciler tasks.
    pub fn start(self) -> RunningCanary {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (assignments_tx, assignments_rx) = watch::channel(Vec::new());
        let fatal = Arc::new(Notify::new());
        let router = self.router();

        let sampler = Sampler::new(
            Arc::clone(&self.counters),
            Arc::clone(&self.produced),
            Arc::clone(&self.consumed),
            self.config.status_check_interval,
        );
        let sampler_shutdown = shutdown_rx.clone();
        let sampler = tokio::spawn(async move { sampler.run(sampler_shutdown).await });

        let reconciler = TopicReconciler::new(
            self.config.clone(),
            Arc::clone(&self.connector),
            self.metrics.clone(),
        );
        let reconciler_shutdown = shutdown_rx.clone();
        let reconciler_fatal = Arc::clone(&fatal);
        let reconciler = tokio::spawn(async move {
            let result = reconciler.run(assignments_tx, reconciler_shutdown).await;
            if result.is_err() {
                reconciler_fatal.notify_one();
            }
            result
        });

        info!(topic = %self.config.topic, "canary started");

        RunningCanary {
            router,
            counters: self.counters,
            shutdown_tx,
            shutdown_rx,
            assignments: assignments_rx,
            fatal,
            sampler,
            reconciler,
            workers: Vec::new(),
        }
    }
}

/// A started canary: background tasks running, HTTP not yet served.
pub struct RunningCanary {
    router: Router,
    counters: Arc<DeliveryCounters>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    assignments: watch::Receiver<Vec<i32>>,
    fatal: Arc<Notify>,
    sampler: JoinHandle<()>,
    reconciler: JoinHandle<TopicResult<()>>,
    workers: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
}

impl RunningCanary {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn counters(&self) -> Arc<DeliveryCounters> {
        Arc::clone(&self.counters)
    }

    /// Latest partition ids published by the reconciler.
    pub fn assignments(&self) -> watch::Receiver<Vec<i32>> {
        self.assignments.clone()
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Track an extra task; `serve` joins it after shutdown. A worker that
    /// returns an error shuts the canary down.
    pub fn spawn_worker<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let fatal = Arc::clone(&self.fatal);
        let handle = tokio::spawn(async move {
            let result = task.await;
            if let Err(e) = &result {
                error!(worker = name, error = %e, "worker failed");
                fatal.notify_one();
            }
            result
        });
        self.workers.push((name, handle));
    }

    /// Stop every task without serving HTTP.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        join_tasks(self.sampler, self.reconciler, self.workers).await
    }

    /// Serve the API until `signal` resolves or a background task fails,
    /// then stop all tasks. The failing task's error is returned.
    pub async fn serve<S>(self, listener: TcpListener, signal: S) -> anyhow::Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let RunningCanary {
            router,
            shutdown_tx,
            fatal,
            sampler,
            reconciler,
            workers,
            ..
        } = self;

        let addr = listener.local_addr()?;
        info!(%addr, "API server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = signal => info!("shutdown signal received"),
                    _ = fatal.notified() => error!("background task failed, shutting down"),
                }
                let _ = shutdown_tx.send(true);
            })
            .await?;

        join_tasks(sampler, reconciler, workers).await
    }
}

/// Resolve when `signal` fires. A signal that cannot be installed never
/// resolves, leaving shutdown to task failures.
pub async fn until_signal<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(error = %e, "failed to install shutdown signal handler");
        std::future::pending::<()>().await;
    }
}

/// Join every task. A reconciler error takes precedence over the first
/// worker error.
async fn join_tasks(
    sampler: JoinHandle<()>,
    reconciler: JoinHandle<TopicResult<()>>,
    workers: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
) -> anyhow::Result<()> {
    let mut worker_error = None;
    for (name, handle) in workers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                worker_error.get_or_insert(e.context(format!("{name} worker failed")));
            }
            Err(e) => warn!(worker = name, error = %e, "worker panicked"),
        }
    }
    sampler.await?;
    reconciler.await??;
    if let Some(e) = worker_error {
        return Err(e);
    }
    info!("canary stopped");
    Ok(())
}
