//! plugin-router server binary.
//!
//! Loads configuration, installs logging and metrics, mounts the demo
//! application and serves it until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use plugin_router::config::{load_config, validate_config, ConfigError, ServerConfig};
use plugin_router::lifecycle::signals::wait_for_signal;
use plugin_router::observability::{logging, metrics};
use plugin_router::{demo, HttpServer};

#[derive(Debug, Parser)]
#[command(name = "plugin-router", version, about = "Plugin-based HTTP router")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability)?;

    tracing::info!("plugin-router v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        max_body_size = config.limits.max_body_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config, demo::application()?)?;
    let handle = server.listen().await?;

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");
    handle.close().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
