//! HTTP handlers. Both read in-memory state only.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::debug;

use canary_metrics::{DeliverySnapshot, render_prometheus};
use canary_sampling::Status;

use crate::ApiState;

/// GET /status
pub async fn status(State(state): State<ApiState>) -> Json<Status> {
    let status = state.status.build_status();
    debug!(
        percentage = status.consuming.percentage,
        time_window_ms = status.consuming.time_window.as_millis() as u64,
        "status requested"
    );
    Json(status)
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let status = state.status.build_status();
    let delivery = DeliverySnapshot::new(&state.counters, &status);
    let body = render_prometheus(&state.metrics.snapshot(), &delivery);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
