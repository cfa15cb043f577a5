//! Label resolution for TAP gateways and optimizer nodes.
//!
//! The taptap observer reports raw bus identifiers. This module maps them to
//! the human-readable names used as Prometheus label values. Unknown ids never
//! fail: they fall back to `Gateway_<id>` / `Node_<id>`.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw gateway identifier as emitted by the observer.
///
/// The observer writes gateway ids as JSON integers, older builds and hand-written
/// configs use strings. Both compare by their text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatewayId {
    Numeric(u64),
    Text(String),
}

impl GatewayId {
    /// Normalised lookup key.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayId::Numeric(n) => write!(f, "{n}"),
            GatewayId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for GatewayId {
    fn from(id: u64) -> Self {
        GatewayId::Numeric(id)
    }
}

impl From<&str> for GatewayId {
    fn from(id: &str) -> Self {
        GatewayId::Text(id.to_string())
    }
}

/// Resolved `(gateway, node)` label values identifying one optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelPair {
    pub gateway: String,
    pub node: String,
}

impl LabelPair {
    pub fn new(gateway: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            node: node.into(),
        }
    }

    /// Label values in `["gateway", "node"]` order for `with_label_values`.
    pub fn values(&self) -> [&str; 2] {
        [&self.gateway, &self.node]
    }
}

impl fmt::Display for LabelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.gateway, self.node)
    }
}

/// Reference deployment: two TAPs on one string.
static DEFAULT_GATEWAYS: Lazy<Vec<(GatewayId, &'static str)>> = Lazy::new(|| {
    vec![
        (GatewayId::Numeric(4609), "TAP1"),
        (GatewayId::Numeric(4610), "TAP2"),
    ]
});

/// Reference deployment node assignments, matched against the Tigo portal by RSSI.
static DEFAULT_NODES: Lazy<Vec<(u64, &'static str)>> = Lazy::new(|| {
    vec![
        (2, "A1"),
        (3, "A2"),
        (4, "A4"),
        (5, "A5"),
        (6, "A3"),
        (7, "A7"),
        (8, "A9"),
        (9, "A10"),
        (10, "A6"),
        (11, "A8"),
        (12, "A11"),
    ]
});

/// Maps raw gateway/node ids to label values.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    gateways: HashMap<String, String>,
    nodes: HashMap<u64, String>,
    // Distinct configured names in id order, for cross-product aggregation.
    gateway_order: Vec<String>,
    node_order: Vec<String>,
}

impl LabelResolver {
    /// Builds a resolver from explicit tables. Later duplicates win.
    pub fn new<G, N>(gateways: G, nodes: N) -> Self
    where
        G: IntoIterator<Item = (GatewayId, String)>,
        N: IntoIterator<Item = (u64, String)>,
    {
        let gateways: HashMap<String, String> = gateways
            .into_iter()
            .map(|(id, name)| (id.key(), name))
            .collect();
        let nodes: HashMap<u64, String> = nodes.into_iter().collect();

        let mut gateway_entries: Vec<(&String, &String)> = gateways.iter().collect();
        gateway_entries.sort_by(|a, b| natural_cmp(a.0, b.0));
        let gateway_order = distinct_names(gateway_entries.into_iter().map(|(_, name)| name));

        let mut node_entries: Vec<(&u64, &String)> = nodes.iter().collect();
        node_entries.sort_by_key(|(id, _)| **id);
        let node_order = distinct_names(node_entries.into_iter().map(|(_, name)| name));

        Self {
            gateways,
            nodes,
            gateway_order,
            node_order,
        }
    }

    /// Label for a gateway id, `Gateway_<id>` if unknown.
    pub fn resolve_gateway(&self, id: &GatewayId) -> String {
        let key = id.key();
        match self.gateways.get(&key) {
            Some(name) => name.clone(),
            None => format!("Gateway_{key}"),
        }
    }

    /// Label for a node id, `Node_<id>` if unknown.
    pub fn resolve_node(&self, id: u64) -> String {
        match self.nodes.get(&id) {
            Some(name) => name.clone(),
            None => format!("Node_{id}"),
        }
    }

    pub fn resolve(&self, gateway: &GatewayId, node: u64) -> LabelPair {
        LabelPair::new(self.resolve_gateway(gateway), self.resolve_node(node))
    }

    /// Configured gateway names, ordered by id. Each name appears once even
    /// when several ids share it.
    pub fn gateway_labels(&self) -> &[String] {
        &self.gateway_order
    }

    /// Configured node names, ordered by id, without repeats.
    pub fn node_labels(&self) -> &[String] {
        &self.node_order
    }

    /// Every configured `(gateway, node)` series key, each exactly once.
    pub fn configured_pairs(&self) -> Vec<LabelPair> {
        self.gateway_order
            .iter()
            .flat_map(|g| {
                self.node_order
                    .iter()
                    .map(move |n| LabelPair::new(g.clone(), n.clone()))
            })
            .collect()
    }
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new(default_gateways(), default_nodes())
    }
}

/// Reference gateway table.
pub fn default_gateways() -> Vec<(GatewayId, String)> {
    DEFAULT_GATEWAYS
        .iter()
        .map(|(id, name)| (id.clone(), name.to_string()))
        .collect()
}

/// Reference node table.
pub fn default_nodes() -> Vec<(u64, String)> {
    DEFAULT_NODES
        .iter()
        .map(|(id, name)| (*id, name.to_string()))
        .collect()
}

/// Keeps the first occurrence of each name.
fn distinct_names<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Numeric ids sort numerically, anything else lexically after them.
fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
