//! Line ingestion: parse, label, store, re-aggregate.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::aggregator::{recompute_total_power, AggregationMode};
use crate::labels::{LabelPair, LabelResolver};
use crate::reading::{ParseError, Reading};
use crate::registry::MetricRegistry;
use crate::stats::IngestStats;

/// Applies observer lines to the shared registry.
///
/// This is the only writer of the registry. Lines are applied in the order
/// they are handed in.
#[derive(Clone)]
pub struct Ingestor {
    resolver: Arc<LabelResolver>,
    registry: Arc<MetricRegistry>,
    stats: Arc<IngestStats>,
    mode: AggregationMode,
}

impl Ingestor {
    pub fn new(
        resolver: Arc<LabelResolver>,
        registry: Arc<MetricRegistry>,
        stats: Arc<IngestStats>,
        mode: AggregationMode,
    ) -> Self {
        Self {
            resolver,
            registry,
            stats,
            mode,
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Ingests one line. A failed line leaves the registry untouched.
    #[instrument(skip(self), level = "trace")]
    pub fn ingest_line(&self, line: &str) -> Result<LabelPair, ParseError> {
        self.stats.lines_total.inc();

        let reading = match Reading::parse(line) {
            Ok(r) => r,
            Err(e) => {
                self.stats.parse_errors_total.inc();
                warn!("Error processing line: {} - {}", line.trim(), e);
                return Err(e);
            }
        };

        Ok(self.apply(&reading))
    }

    /// Counts a line the reader discarded for exceeding the length limit.
    pub fn reject_overlong(&self, len: usize) -> ParseError {
        self.stats.lines_total.inc();
        self.stats.parse_errors_total.inc();
        let e = ParseError::Overlong(len);
        warn!("Error processing line: <{} bytes omitted> - {}", len, e);
        e
    }

    /// Stores a decoded reading and refreshes the total.
    pub fn apply(&self, reading: &Reading) -> LabelPair {
        let pair = self.resolver.resolve(&reading.gateway_id, reading.node_id);
        debug!("Data received: {} - {}", pair.gateway, pair.node);

        self.registry.record(&pair, reading);
        recompute_total_power(&self.registry, &self.resolver, self.mode);
        self.stats.record_reading();
        pair
    }
}
