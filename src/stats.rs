//! Ingestion statistics for the exporter itself.
//!
//! Counters are Prometheus `IntCounter`s registered next to the optimizer
//! gauges, so the same values back both `/metrics` and the `/health` table.

use prometheus::{IntCounter, Registry};
use std::fmt::Write as FmtWrite;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Counters describing the ingestion loop.
pub struct IngestStats {
    pub lines_total: IntCounter,
    pub readings_total: IntCounter,
    pub parse_errors_total: IntCounter,
    pub child_spawns_total: IntCounter,
    pub child_spawn_failures_total: IntCounter,
    pub child_restarts_total: IntCounter,
    last_reading: Mutex<Option<Instant>>,
    start_time: Instant,
}

impl IngestStats {
    /// Creates and registers the self-metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let lines_total = IntCounter::new(
            "taptap_exporter_lines_total",
            "Lines read from the taptap observer",
        )?;
        let readings_total = IntCounter::new(
            "taptap_exporter_readings_total",
            "Readings decoded and applied to the optimizer gauges",
        )?;
        let parse_errors_total = IntCounter::new(
            "taptap_exporter_parse_errors_total",
            "Observer lines that could not be decoded",
        )?;
        let child_spawns_total = IntCounter::new(
            "taptap_exporter_child_spawns_total",
            "Times the taptap observer was started",
        )?;
        let child_spawn_failures_total = IntCounter::new(
            "taptap_exporter_child_spawn_failures_total",
            "Attempts to start the taptap observer that failed",
        )?;
        let child_restarts_total = IntCounter::new(
            "taptap_exporter_child_restarts_total",
            "Times the supervisor entered backoff before restarting the observer",
        )?;

        registry.register(Box::new(lines_total.clone()))?;
        registry.register(Box::new(readings_total.clone()))?;
        registry.register(Box::new(parse_errors_total.clone()))?;
        registry.register(Box::new(child_spawns_total.clone()))?;
        registry.register(Box::new(child_spawn_failures_total.clone()))?;
        registry.register(Box::new(child_restarts_total.clone()))?;

        Ok(Self {
            lines_total,
            readings_total,
            parse_errors_total,
            child_spawns_total,
            child_spawn_failures_total,
            child_restarts_total,
            last_reading: Mutex::new(None),
            start_time: Instant::now(),
        })
    }

    pub fn record_reading(&self) {
        self.readings_total.inc();
        *self
            .last_reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Time since the last successfully applied reading.
    pub fn since_last_reading(&self) -> Option<Duration> {
        self.last_reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed())
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Renders the counters as a plain-text table.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        writeln!(out, "INGESTION").ok();
        writeln!(out, "=========").ok();
        writeln!(out).ok();
        writeln!(out, "{:28} | {:>12}", "Counter", "Value").ok();
        writeln!(out, "{}", "-".repeat(43)).ok();

        let rows = [
            ("lines read", self.lines_total.get()),
            ("readings applied", self.readings_total.get()),
            ("parse errors", self.parse_errors_total.get()),
            ("observer starts", self.child_spawns_total.get()),
            ("observer start failures", self.child_spawn_failures_total.get()),
            ("observer restarts", self.child_restarts_total.get()),
        ];
        for (name, value) in rows {
            writeln!(out, "{:28} | {:>12}", name, value).ok();
        }

        writeln!(out).ok();
        match self.since_last_reading() {
            Some(age) => writeln!(out, "Last reading: {:.1}s ago", age.as_secs_f64()).ok(),
            None => writeln!(out, "Last reading: never").ok(),
        };
        out
    }
}
