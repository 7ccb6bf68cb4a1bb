//! Periodic sampling of the produced/consumed totals into the rings.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::ring::SampleRing;

/// Cumulative record totals bumped by the producer and consumer loops.
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    produced: AtomicI64,
    consumed: AtomicI64,
}

impl DeliveryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_produced(&self, records: i64) {
        self.produced.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_consumed(&self, records: i64) {
        self.consumed.fetch_add(records, Ordering::Relaxed);
    }

    pub fn produced(&self) -> i64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn consumed(&self) -> i64 {
        self.consumed.load(Ordering::Relaxed)
    }
}

/// Appends one sample of each total per status check interval. It is the
/// only writer of both rings.
pub struct Sampler {
    counters: Arc<DeliveryCounters>,
    produced: Arc<SampleRing>,
    consumed: Arc<SampleRing>,
    interval: Duration,
}

impl Sampler {
    pub fn new(
        counters: Arc<DeliveryCounters>,
        produced: Arc<SampleRing>,
        consumed: Arc<SampleRing>,
        interval: Duration,
    ) -> Self {
        Self {
            counters,
            produced,
            consumed,
            interval,
        }
    }

    /// Take one sample of both totals.
    pub fn sample(&self) {
        let produced = self.counters.produced();
        let consumed = self.counters.consumed();
        self.produced.append(produced);
        self.consumed.append(consumed);
        debug!(produced, consumed, "sampled delivery counters");
    }

    /// Sample on every tick until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "delivery sampler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sample(),
                _ = shutdown.changed() => {
                    info!("delivery sampler shutting down");
                    break;
                }
            }
        }
    }
}
