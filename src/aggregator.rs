//! Derived total output power.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::labels::{LabelPair, LabelResolver};
use crate::registry::{MetricKind, MetricRegistry};

/// Which `(gateway, node)` pairs contribute to the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Every pair ever observed, including ids missing from the label tables.
    #[default]
    Seen,
    /// Only the cross product of the configured gateway and node tables.
    Configured,
}

/// Sums per-node power and stores it in `taptap_total_power`.
pub fn recompute_total_power(
    registry: &MetricRegistry,
    resolver: &LabelResolver,
    mode: AggregationMode,
) -> f64 {
    let total = match mode {
        AggregationMode::Seen => sum_power(registry, &registry.seen_pairs(), |pair| {
            warn!("Skipping {} in total: no power value recorded", pair);
        }),
        AggregationMode::Configured => {
            sum_power(registry, &resolver.configured_pairs(), |pair| {
                trace!("No power value for configured pair {}", pair);
            })
        }
    };

    registry.set_total_power(total);
    total
}

fn sum_power<F>(registry: &MetricRegistry, pairs: &[LabelPair], on_missing: F) -> f64
where
    F: Fn(&LabelPair),
{
    pairs
        .iter()
        .map(|pair| match registry.get(MetricKind::Power, pair) {
            Some(power) => power,
            None => {
                on_missing(pair);
                0.0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::GatewayId;

    fn resolver() -> LabelResolver {
        LabelResolver::new(
            vec![(GatewayId::Numeric(1), "TAP1".to_string())],
            vec![(1, "A1".to_string()), (2, "A2".to_string())],
        )
    }

    #[test]
    fn test_empty_registry_total_is_zero() {
        let registry = MetricRegistry::new().unwrap();
        for mode in [AggregationMode::Seen, AggregationMode::Configured] {
            assert_eq!(recompute_total_power(&registry, &resolver(), mode), 0.0);
            assert_eq!(registry.total_power(), 0.0);
        }
    }

    #[test]
    fn test_seen_mode_sums_seen_pairs() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "A1"), 10.0);
        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "A2"), 15.5);

        let total = recompute_total_power(&registry, &resolver(), AggregationMode::Seen);
        assert_eq!(total, 25.5);

        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "A1"), 20.0);
        let total = recompute_total_power(&registry, &resolver(), AggregationMode::Seen);
        assert_eq!(total, 35.5);
        assert_eq!(registry.total_power(), 35.5);
    }

    #[test]
    fn test_seen_pair_without_power_counts_as_zero() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(MetricKind::Rssi, &LabelPair::new("TAP1", "A1"), -70.0);
        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "A2"), 4.0);

        let total = recompute_total_power(&registry, &resolver(), AggregationMode::Seen);
        assert_eq!(total, 4.0);
    }

    #[test]
    fn test_modes_diverge_on_unknown_ids() {
        let registry = MetricRegistry::new().unwrap();
        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "A1"), 10.0);
        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "Node_42"), 7.0);
        registry.set(MetricKind::Power, &LabelPair::new("Gateway_9", "A2"), 3.0);

        let seen = recompute_total_power(&registry, &resolver(), AggregationMode::Seen);
        assert_eq!(seen, 20.0);

        let configured =
            recompute_total_power(&registry, &resolver(), AggregationMode::Configured);
        assert_eq!(configured, 10.0);
    }

    #[test]
    fn test_configured_mode_counts_shared_name_once() {
        let resolver = LabelResolver::new(
            vec![(GatewayId::Numeric(4609), "TAP1".to_string())],
            vec![(2, "A1".to_string()), (3, "A1".to_string())],
        );
        let registry = MetricRegistry::new().unwrap();
        registry.set(MetricKind::Power, &LabelPair::new("TAP1", "A1"), 10.0);

        let total = recompute_total_power(&registry, &resolver, AggregationMode::Configured);
        assert_eq!(total, 10.0);
        assert_eq!(registry.total_power(), 10.0);
    }
}
