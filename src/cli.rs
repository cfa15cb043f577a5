//! CLI arguments for taptap-exporter.
//!
//! This module defines the command-line interface structure using the clap library.

use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::aggregator::AggregationMode;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Default, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "taptap-exporter",
    about = "Prometheus exporter for Tigo optimizer telemetry read by taptap",
    long_about = "Prometheus exporter for Tigo optimizer telemetry read by taptap.\n\n\
                  Supervises `taptap observe` on the TAP serial bus, keeps the latest \
                  voltage, current, power, temperature and RSSI per optimizer and serves \
                  them together with the total output power on /metrics.",
    version,
    propagate_version = true
)]
pub struct Args {
    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path to the taptap binary
    #[arg(long)]
    pub taptap_binary: Option<PathBuf>,

    /// Serial device the TAP bus is attached to
    #[arg(short = 's', long = "serial")]
    pub serial_device: Option<String>,

    /// Seconds to wait before restarting taptap
    #[arg(long)]
    pub restart_delay_secs: Option<u64>,

    /// Which optimizers count towards taptap_total_power
    #[arg(long, value_enum)]
    pub aggregation: Option<AggregationMode>,
}
