//! canary-api — HTTP API for the Kafka canary.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/status` | Delivery status snapshot (JSON) |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use canary_metrics::CanaryMetrics;
use canary_sampling::{DeliveryCounters, StatusReporter};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub status: StatusReporter,
    pub metrics: Arc<CanaryMetrics>,
    pub counters: Arc<DeliveryCounters>,
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
