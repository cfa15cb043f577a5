//! HTTP endpoint handlers for the exporter.
//!
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Ingestion health endpoint

pub mod health;
pub mod metrics;

use axum::{routing::get, Router};

use crate::state::SharedState;

pub use health::health_handler;
pub use metrics::metrics_handler;

/// Builds the router for the configured endpoints.
pub fn build_router(state: SharedState) -> Router {
    let mut app = Router::new().route("/metrics", get(metrics_handler));

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    app.with_state(state)
}
