//! taptap-exporter library
//!
//! Turns the JSON stream of `taptap observe` into Prometheus gauges: one set of
//! voltage/current/power/temperature/RSSI gauges per `(gateway, node)` pair and
//! a derived `taptap_total_power`.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use taptap_exporter::{AggregationMode, IngestStats, Ingestor, LabelResolver, MetricRegistry};
//!
//! let registry = Arc::new(MetricRegistry::new()?);
//! let stats = Arc::new(IngestStats::new(registry.prometheus())?);
//! let ingestor = Ingestor::new(
//!     Arc::new(LabelResolver::default()),
//!     registry.clone(),
//!     stats,
//!     AggregationMode::Seen,
//! );
//!
//! ingestor.ingest_line(
//!     r#"{"gateway":{"id":4609},"node":{"id":2},"voltage_in":36.1,"voltage_out":35.0,"current":4.0,"temperature":38.0,"rssi":-64}"#,
//! )?;
//! assert_eq!(registry.total_power(), 140.0);
//!
//! let exposition = registry.render()?;
//! assert!(exposition.contains(r#"taptap_power{gateway="TAP1",node="A1"} 140"#));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod labels;
pub mod pipeline;
pub mod reading;
pub mod registry;
pub mod state;
pub mod stats;
pub mod supervisor;

// Re-export main types for convenience
pub use aggregator::{recompute_total_power, AggregationMode};
pub use labels::{GatewayId, LabelPair, LabelResolver};
pub use pipeline::Ingestor;
pub use reading::{ParseError, Reading};
pub use registry::{MetricKind, MetricRegistry};
pub use stats::IngestStats;
pub use supervisor::{ProcessSpawner, SpawnedChild, Supervisor, SupervisorState, TaptapCommand};
