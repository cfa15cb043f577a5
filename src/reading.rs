//! Decoding of taptap observer output.
//!
//! Each line on the observer's stdout is one JSON object describing a power
//! report relayed by a TAP:
//!
//! ```json
//! {"gateway":{"id":4609},"node":{"id":2},"voltage_in":35.2,"voltage_out":34.9,
//!  "current":8.1,"temperature":41.5,"rssi":-62}
//! ```
//!
//! Fields we don't use are ignored. A line either decodes completely or not at
//! all.

use serde::Deserialize;
use serde_json::error::Category;
use thiserror::Error;

use crate::labels::GatewayId;

/// Reasons a line could not be turned into a [`Reading`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("malformed JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("missing or invalid field: {0}")]
    Field(#[source] serde_json::Error),

    #[error("line of {0} bytes exceeds the length limit")]
    Overlong(usize),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Data => ParseError::Field(e),
            Category::Syntax | Category::Eof | Category::Io => ParseError::Syntax(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayRef {
    id: GatewayId,
}

#[derive(Debug, Deserialize)]
struct NodeRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RawReading {
    gateway: GatewayRef,
    node: NodeRef,
    voltage_in: f64,
    voltage_out: f64,
    current: f64,
    temperature: f64,
    rssi: f64,
}

/// One optimizer power report.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub gateway_id: GatewayId,
    pub node_id: u64,
    pub voltage_in: f64,
    pub voltage_out: f64,
    pub current: f64,
    pub temperature: f64,
    pub rssi: f64,
}

impl Reading {
    /// Parses a single observer line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let raw: RawReading = serde_json::from_str(line)?;
        Ok(Self {
            gateway_id: raw.gateway.id,
            node_id: raw.node.id,
            voltage_in: raw.voltage_in,
            voltage_out: raw.voltage_out,
            current: raw.current,
            temperature: raw.temperature,
            rssi: raw.rssi,
        })
    }

    /// Output power in watts.
    pub fn power(&self) -> f64 {
        self.voltage_out * self.current
    }
}
