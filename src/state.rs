//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers. The ingestion loop holds its own handles to the same
//! registry and statistics.

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::registry::MetricRegistry;
use crate::stats::IngestStats;
use crate::supervisor::SupervisorState;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Read-only view of the exporter shared with HTTP handlers.
pub struct AppState {
    pub registry: Arc<MetricRegistry>,
    pub stats: Arc<IngestStats>,
    /// Current state of the observer supervisor.
    pub supervisor_state: watch::Receiver<SupervisorState>,
    pub config: Arc<Config>,
}
