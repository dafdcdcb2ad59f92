//! EdgeLink device service binary.
//!
//! Loads the TOML configuration, wires the simulated driver into the
//! runtime, and serves the HTTP surface until interrupted. Any bootstrap
//! failure exits non-zero.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgelink_core::config::Config;
use edgelink_runtime::driver::sim::SimDriver;
use edgelink_runtime::{bootstrap, http};

/// EdgeLink device service.
#[derive(Parser, Debug)]
#[command(name = "edgelink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing configuration.toml.
    #[arg(long, default_value = edgelink_core::config::DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config_dir)
        .with_context(|| format!("loading configuration from {:?}", args.config_dir))?;
    init_logging(&config)?;

    let driver = Arc::new(SimDriver::new());
    let runtime = Arc::new(bootstrap(config, driver).await?);

    let bind = format!(
        "{}:{}",
        runtime.config.service.host, runtime.config.service.port
    );
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding http surface to {}", bind))?;
    info!(address = %bind, "edgelink device service listening");

    let app = http::router(runtime.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http surface failed")?;

    runtime.shutdown(false).await;
    Ok(())
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level().to_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.logging.file.is_empty() {
        builder.init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)
            .with_context(|| format!("opening log file {}", config.logging.file))?;
        builder.with_writer(Arc::new(file)).with_ansi(false).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
