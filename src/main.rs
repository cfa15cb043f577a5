//! taptap-exporter - version 0.1.0
//!
//! Supervises the taptap observer and serves its readings on /metrics.
//! This is the main entry point that wires configuration, logging, the
//! ingestion loop and the HTTP server together.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{info, Level};

use taptap_exporter::cli::{Args, LogLevel};
use taptap_exporter::config::{
    render_config, resolve_config, validate_effective_config, Config, DEFAULT_SERIAL_DEVICE,
    DEFAULT_TAPTAP_BINARY,
};
use taptap_exporter::handlers::build_router;
use taptap_exporter::state::AppState;
use taptap_exporter::{IngestStats, Ingestor, MetricRegistry, Supervisor, TaptapCommand};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };

    let Some(log_level) = log_level else {
        return;
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already installed");
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args).context("Failed to load configuration")?;
    validate_effective_config(&config).context("Configuration invalid")?;
    Ok(config)
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.check_config {
        if let Err(e) = load_validated_config(&args) {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        let config = resolve_config(&args)?;
        println!("{}", render_config(&config, args.config_format)?);
        return Ok(());
    }

    let config = match load_validated_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    setup_logging(&args);
    info!("Starting taptap-exporter");

    let registry = Arc::new(MetricRegistry::new()?);
    let stats = Arc::new(IngestStats::new(registry.prometheus())?);
    let resolver = Arc::new(config.resolver());
    let mode = config.aggregation.unwrap_or_default();
    info!(
        "Label tables: {} gateways, {} nodes; aggregation mode {:?}",
        resolver.gateway_labels().len(),
        resolver.node_labels().len(),
        mode
    );

    let ingestor = Ingestor::new(resolver, registry.clone(), stats.clone(), mode);
    let command = TaptapCommand::new(
        config
            .taptap_binary
            .clone()
            .unwrap_or_else(|| DEFAULT_TAPTAP_BINARY.into()),
        config
            .serial_device
            .clone()
            .unwrap_or_else(|| DEFAULT_SERIAL_DEVICE.to_string()),
    );
    let supervisor = Supervisor::new(command, ingestor, config.restart_delay());
    let supervisor_state = supervisor.subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx));

    let addr = config.listen_addr().context("Invalid listen address")?;

    let state = Arc::new(AppState {
        registry,
        stats,
        supervisor_state,
        config: Arc::new(config.clone()),
    });
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("taptap-exporter listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_tx.send_replace(true);
    if let Err(e) = supervisor_task.await {
        tracing::warn!("Supervisor task ended abnormally: {}", e);
    }

    info!("taptap-exporter stopped gracefully");
    Ok(())
}
