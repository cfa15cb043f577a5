//! Prometheus-backed store of the latest optimizer values.
//!
//! Every per-node metric is a `GaugeVec` labelled `gateway,node`; the derived
//! total is an ungrouped `Gauge`. Gauge values are atomic, so a scrape never
//! sees a torn value. A small index of created series sits behind a `RwLock`:
//! it is taken for lookups, for creating a new series, and around `gather()`,
//! so a freshly created series is never exported before its first value lands.

use ahash::AHashMap as HashMap;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::string::FromUtf8Error;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::debug;

use crate::labels::LabelPair;
use crate::reading::Reading;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

const LABELS: &[&str] = &["gateway", "node"];

const KIND_COUNT: usize = 6;

/// Name of the derived total power series.
pub const TOTAL_POWER_METRIC: &str = "taptap_total_power";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("encoded metrics are not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Per-node metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    VoltageIn,
    VoltageOut,
    Current,
    Power,
    Temperature,
    Rssi,
}

impl MetricKind {
    pub const ALL: [MetricKind; KIND_COUNT] = [
        MetricKind::VoltageIn,
        MetricKind::VoltageOut,
        MetricKind::Current,
        MetricKind::Power,
        MetricKind::Temperature,
        MetricKind::Rssi,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn metric_name(self) -> &'static str {
        match self {
            MetricKind::VoltageIn => "taptap_voltage_in",
            MetricKind::VoltageOut => "taptap_voltage_out",
            MetricKind::Current => "taptap_current",
            MetricKind::Power => "taptap_power",
            MetricKind::Temperature => "taptap_temperature",
            MetricKind::Rssi => "taptap_rssi",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            MetricKind::VoltageIn => "Input Voltage",
            MetricKind::VoltageOut => "Output Voltage",
            MetricKind::Current => "Current",
            MetricKind::Power => "Output Power",
            MetricKind::Temperature => "Temperature",
            MetricKind::Rssi => "Signal Strength",
        }
    }

    /// Value of this kind carried by a reading. Power is derived.
    pub fn value_of(self, reading: &Reading) -> f64 {
        match self {
            MetricKind::VoltageIn => reading.voltage_in,
            MetricKind::VoltageOut => reading.voltage_out,
            MetricKind::Current => reading.current,
            MetricKind::Power => reading.power(),
            MetricKind::Temperature => reading.temperature,
            MetricKind::Rssi => reading.rssi,
        }
    }
}

/// The exported gauge families.
#[derive(Clone)]
pub struct TapMetrics {
    pub voltage_in: GaugeVec,   // labels: gateway, node
    pub voltage_out: GaugeVec,  // labels: gateway, node
    pub current: GaugeVec,      // labels: gateway, node
    pub power: GaugeVec,        // labels: gateway, node
    pub temperature: GaugeVec,  // labels: gateway, node
    pub rssi: GaugeVec,         // labels: gateway, node
    pub total_power: Gauge,
}

impl TapMetrics {
    /// Creates and registers all gauge families with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let per_node = |kind: MetricKind| {
            GaugeVec::new(Opts::new(kind.metric_name(), kind.help()), LABELS)
        };

        let voltage_in = per_node(MetricKind::VoltageIn)?;
        let voltage_out = per_node(MetricKind::VoltageOut)?;
        let current = per_node(MetricKind::Current)?;
        let power = per_node(MetricKind::Power)?;
        let temperature = per_node(MetricKind::Temperature)?;
        let rssi = per_node(MetricKind::Rssi)?;
        let total_power = Gauge::new(TOTAL_POWER_METRIC, "Total Output Power of All Nodes")?;

        registry.register(Box::new(voltage_in.clone()))?;
        registry.register(Box::new(voltage_out.clone()))?;
        registry.register(Box::new(current.clone()))?;
        registry.register(Box::new(power.clone()))?;
        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(rssi.clone()))?;
        registry.register(Box::new(total_power.clone()))?;

        Ok(Self {
            voltage_in,
            voltage_out,
            current,
            power,
            temperature,
            rssi,
            total_power,
        })
    }

    fn family(&self, kind: MetricKind) -> &GaugeVec {
        match kind {
            MetricKind::VoltageIn => &self.voltage_in,
            MetricKind::VoltageOut => &self.voltage_out,
            MetricKind::Current => &self.current,
            MetricKind::Power => &self.power,
            MetricKind::Temperature => &self.temperature,
            MetricKind::Rssi => &self.rssi,
        }
    }
}

/// Gauge handles created so far for one `(gateway, node)` pair.
#[derive(Default)]
struct NodeSeries {
    gauges: [Option<Gauge>; KIND_COUNT],
}

/// Last-value-wins store shared by the ingestion loop and the HTTP handlers.
pub struct MetricRegistry {
    registry: Registry,
    metrics: TapMetrics,
    series: RwLock<HashMap<LabelPair, NodeSeries>>,
}

impl MetricRegistry {
    pub fn new() -> Result<Self, RegistryError> {
        let registry = Registry::new();
        let metrics = TapMetrics::new(&registry)?;
        debug!("Prometheus registry initialized");

        Ok(Self {
            registry,
            metrics,
            series: RwLock::new(HashMap::new()),
        })
    }

    /// Underlying Prometheus registry, for registering self-metrics.
    pub fn prometheus(&self) -> &Registry {
        &self.registry
    }

    fn read_series(&self) -> RwLockReadGuard<'_, HashMap<LabelPair, NodeSeries>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_series(&self) -> RwLockWriteGuard<'_, HashMap<LabelPair, NodeSeries>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the value of one series, creating it on first use.
    pub fn set(&self, kind: MetricKind, pair: &LabelPair, value: f64) {
        {
            let series = self.read_series();
            if let Some(gauge) = series
                .get(pair)
                .and_then(|s| s.gauges[kind.index()].as_ref())
            {
                gauge.set(value);
                return;
            }
        }

        let mut series = self.write_series();
        let entry = series.entry(pair.clone()).or_default();
        match &entry.gauges[kind.index()] {
            Some(gauge) => gauge.set(value),
            None => {
                let gauge = self
                    .metrics
                    .family(kind)
                    .with_label_values(&pair.values());
                gauge.set(value);
                entry.gauges[kind.index()] = Some(gauge);
                debug!("Created series {}{{{}}}", kind.metric_name(), pair);
            }
        }
    }

    /// Writes every per-node kind carried by a reading.
    pub fn record(&self, pair: &LabelPair, reading: &Reading) {
        for kind in MetricKind::ALL {
            self.set(kind, pair, kind.value_of(reading));
        }
    }

    /// Current value of one series, `None` if it was never set.
    pub fn get(&self, kind: MetricKind, pair: &LabelPair) -> Option<f64> {
        self.read_series()
            .get(pair)
            .and_then(|s| s.gauges[kind.index()].as_ref())
            .map(Gauge::get)
    }

    pub fn get_or_zero(&self, kind: MetricKind, pair: &LabelPair) -> f64 {
        self.get(kind, pair).unwrap_or(0.0)
    }

    /// Every pair that has had at least one value written.
    pub fn seen_pairs(&self) -> Vec<LabelPair> {
        let mut pairs: Vec<LabelPair> = self.read_series().keys().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn set_total_power(&self, value: f64) {
        self.metrics.total_power.set(value);
    }

    pub fn total_power(&self) -> f64 {
        self.metrics.total_power.get()
    }

    /// Encodes the current state in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, RegistryError> {
        let families = {
            let _series = self.read_series();
            self.registry.gather()
        };

        let mut buffer = Vec::with_capacity(BUFFER_CAP);
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
