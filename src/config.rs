//! Configuration management for taptap-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use ahash::AHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::aggregator::AggregationMode;
use crate::cli::{Args, ConfigFormat};
use crate::labels::{default_gateways, default_nodes, GatewayId, LabelResolver};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TAPTAP_BINARY: &str = "/root/target/release/taptap";
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render configuration: {0}")]
    Render(String),

    #[error("{0}")]
    Invalid(String),
}

/// One gateway label table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayLabel {
    pub id: GatewayId,
    pub name: String,
}

/// One node label table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLabel {
    pub id: u64,
    pub name: String,
}

/// Exporter configuration. Unset fields fall back to the defaults above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,

    // Observer process
    #[serde(alias = "taptap-binary")]
    pub taptap_binary: Option<PathBuf>,
    #[serde(alias = "serial-device", alias = "serial")]
    pub serial_device: Option<String>,
    #[serde(alias = "restart-delay-secs")]
    pub restart_delay_secs: Option<u64>,

    // Aggregation
    pub aggregation: Option<AggregationMode>,

    // Label tables (kept last: TOML needs tables after plain values)
    pub gateways: Option<Vec<GatewayLabel>>,
    pub nodes: Option<Vec<NodeLabel>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            enable_health: Some(true),
            taptap_binary: Some(PathBuf::from(DEFAULT_TAPTAP_BINARY)),
            serial_device: Some(DEFAULT_SERIAL_DEVICE.to_string()),
            restart_delay_secs: Some(DEFAULT_RESTART_DELAY_SECS),
            aggregation: Some(AggregationMode::default()),
            gateways: Some(
                default_gateways()
                    .into_iter()
                    .map(|(id, name)| GatewayLabel { id, name })
                    .collect(),
            ),
            nodes: Some(
                default_nodes()
                    .into_iter()
                    .map(|(id, name)| NodeLabel { id, name })
                    .collect(),
            ),
        }
    }
}

impl Config {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(
            self.restart_delay_secs
                .unwrap_or(DEFAULT_RESTART_DELAY_SECS),
        )
    }

    /// Socket address the HTTP server binds to. IPv6 addresses such as `::`
    /// are accepted as well as IPv4 ones.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        let ip: IpAddr = bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid bind address '{}'", bind)))?;
        Ok(SocketAddr::new(ip, self.port.unwrap_or(DEFAULT_PORT)))
    }

    /// Label resolver for the configured tables. A missing table uses the
    /// reference deployment's table.
    pub fn resolver(&self) -> LabelResolver {
        let gateways = match &self.gateways {
            Some(entries) => entries
                .iter()
                .map(|e| (e.id.clone(), e.name.clone()))
                .collect(),
            None => default_gateways(),
        };
        let nodes = match &self.nodes {
            Some(entries) => entries.iter().map(|e| (e.id, e.name.clone())).collect(),
            None => default_nodes(),
        };
        LabelResolver::new(gateways, nodes)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.restart_delay_secs == Some(0) {
        return Err(ConfigError::Invalid(
            "restart_delay_secs must be greater than 0".into(),
        ));
    }

    if cfg
        .taptap_binary
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(ConfigError::Invalid("taptap_binary must not be empty".into()));
    }

    if cfg.serial_device.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::Invalid("serial_device must not be empty".into()));
    }

    cfg.listen_addr()?;

    if let Some(gateways) = &cfg.gateways {
        let mut seen = HashSet::new();
        let mut names = HashSet::new();
        for gw in gateways {
            if gw.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Gateway {} has an empty name",
                    gw.id
                )));
            }
            if !seen.insert(gw.id.key()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate gateway id {}",
                    gw.id
                )));
            }
            if !names.insert(gw.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate gateway name {}",
                    gw.name
                )));
            }
        }
    }

    if let Some(nodes) = &cfg.nodes {
        let mut seen = HashSet::new();
        let mut names = HashSet::new();
        for node in nodes {
            if node.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Node {} has an empty name",
                    node.id
                )));
            }
            if !seen.insert(node.id) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate node id {}",
                    node.id
                )));
            }
            if !names.insert(node.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate node name {}",
                    node.name
                )));
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(binary) = &args.taptap_binary {
        config.taptap_binary = Some(binary.clone());
    }
    if let Some(device) = &args.serial_device {
        config.serial_device = Some(device.clone());
    }
    if let Some(delay) = args.restart_delay_secs {
        config.restart_delay_secs = Some(delay);
    }
    if let Some(mode) = args.aggregation {
        config.aggregation = Some(mode);
    }

    Ok(config)
}

/// Loads a config file, or the first default location that exists.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/taptap-exporter/config.yaml",
                "/etc/taptap-exporter/config.yml",
                "/etc/taptap-exporter/config.json",
                "./taptap-exporter.yaml",
                "./taptap-exporter.yml",
                "./taptap-exporter.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?,
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.clone(),
            source,
        })?,
        _ => serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.clone(),
            source,
        })?,
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Renders configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Render(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::Render(e.to_string()))
        }
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| ConfigError::Render(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        assert!(validate_effective_config(&cfg).is_ok());
        assert_eq!(cfg.port, Some(8000));
        assert_eq!(cfg.restart_delay(), Duration::from_secs(5));
        assert_eq!(cfg.resolver().resolve_node(2), "A1");
    }

    #[test]
    fn test_load_yaml_with_tables() {
        let file = write_config(
            ".yaml",
            "port: 9100\n\
             aggregation: configured\n\
             gateways:\n  - id: 4609\n    name: East\n  - id: \"4610\"\n    name: West\n\
             nodes:\n  - id: 2\n    name: E1\n",
        );
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.port, Some(9100));
        assert_eq!(cfg.aggregation, Some(AggregationMode::Configured));

        let resolver = cfg.resolver();
        assert_eq!(resolver.resolve_gateway(&GatewayId::Numeric(4610)), "West");
        assert_eq!(resolver.resolve_node(2), "E1");
        assert_eq!(resolver.resolve_node(3), "Node_3");
    }

    #[test]
    fn test_missing_tables_use_reference_tables() {
        let file = write_config(".json", r#"{"serial_device": "/dev/ttyACM0"}"#);
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.serial_device.as_deref(), Some("/dev/ttyACM0"));
        assert!(cfg.gateways.is_none());
        assert_eq!(
            cfg.resolver().resolve_gateway(&GatewayId::Numeric(4609)),
            "TAP1"
        );
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            "restart_delay_secs = 10\n\n[[nodes]]\nid = 7\nname = \"Garage\"\n",
        );
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.restart_delay(), Duration::from_secs(10));
        assert_eq!(cfg.resolver().resolve_node(7), "Garage");
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let file = write_config(".yaml", "port: [not a port\n");
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cfg = Config {
            restart_delay_secs: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());

        let cfg = Config {
            nodes: Some(vec![
                NodeLabel { id: 2, name: "A1".into() },
                NodeLabel { id: 2, name: "A2".into() },
            ]),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate node id 2");

        let cfg = Config {
            gateways: Some(vec![
                GatewayLabel { id: GatewayId::Numeric(1), name: "A".into() },
                GatewayLabel { id: GatewayId::from("1"), name: "B".into() },
            ]),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_validation_rejects_shared_names() {
        let cfg = Config {
            nodes: Some(vec![
                NodeLabel { id: 2, name: "A1".into() },
                NodeLabel { id: 3, name: "A1".into() },
            ]),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate node name A1");

        let cfg = Config {
            gateways: Some(vec![
                GatewayLabel { id: GatewayId::Numeric(4609), name: "TAP1".into() },
                GatewayLabel { id: GatewayId::Numeric(4610), name: "TAP1".into() },
            ]),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate gateway name TAP1");
    }

    #[test]
    fn test_listen_addr_accepts_ipv6() {
        let cfg = Config {
            bind: Some("::".into()),
            port: Some(9100),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_ok());
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "[::]:9100");

        let cfg = Config::default();
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "0.0.0.0:8000");

        let cfg = Config {
            bind: Some("localhost".into()),
            ..Config::default()
        };
        assert!(cfg.listen_addr().is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(".yaml", "port: 9100\nserial_device: /dev/ttyUSB1\n");
        let args = Args {
            config: Some(file.path().to_path_buf()),
            port: Some(9200),
            ..Args::default()
        };
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.port, Some(9200));
        assert_eq!(cfg.serial_device.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_render_all_formats() {
        let cfg = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let out = render_config(&cfg, format).unwrap();
            assert!(out.contains("taptap_binary"));
            assert!(out.contains("TAP1"));
        }
    }
}
