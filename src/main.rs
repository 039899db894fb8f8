//! sqlgauge binary entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlgauge::{create_router, AppState, Exporter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SQL query metrics exporter.
#[derive(Parser, Debug)]
#[command(name = "sqlgauge", version, about, long_about = None)]
struct Cli {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", default_value = ":9237")]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    telemetry_path: String,

    /// Configuration file name.
    #[arg(long = "config.file", env = "CONFIG", default_value = "config.yml")]
    config_file: String,

    /// Use database connectivity check as healthz probe.
    #[arg(long = "db.connectivity-as-healthz")]
    db_connectivity_as_healthz: bool,
}

/// Map the `LOGLEVEL` environment variable onto a tracing filter.
///
/// An unrecognized level is a configuration error and fails startup.
fn log_filter() -> Result<&'static str, String> {
    match std::env::var("LOGLEVEL")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "" | "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "fatal" => Ok("error"),
        other => Err(format!("unknown LOGLEVEL `{other}`")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config_file, "Starting sqlgauge");
    let exporter = Arc::new(Exporter::from_file(&cli.config_file).await.map_err(|e| {
        tracing::error!(error = %e, "Error starting exporter");
        e
    })?);
    exporter.start().await?;

    let state = AppState {
        exporter: Arc::clone(&exporter),
        metrics_path: cli.telemetry_path.clone(),
        deep_check: cli.db_connectivity_as_healthz,
    };
    let app = create_router(state);

    // Accept Go-style ":9237" shorthand for the bind address.
    let listen = if cli.listen_address.starts_with(':') {
        format!("0.0.0.0{}", cli.listen_address)
    } else {
        cli.listen_address.clone()
    };
    let addr: SocketAddr = listen.parse()?;

    tracing::info!(%addr, path = %cli.telemetry_path, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&exporter)))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM, then tear the exporter down.
async fn shutdown_signal(exporter: Arc<Exporter>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down jobs and connections...");
    exporter.shutdown().await;
}
