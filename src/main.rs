//! http-forwarder
//!
//! Local HTTP reverse-forwarding server.
//!
//! This binary:
//! - Loads env-driven configuration (`FORWARDER_*`)
//! - Starts a forwarder relaying `http://localhost:<port>` to the target
//! - Logs the local URL consumers should request
//! - Stops the forwarder on Ctrl-C

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use http_forwarder::{config::Config, Forwarder, ForwarderConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FORWARDER_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let (target_base_url, target_path) = config.split_target()?;

    info!(
        target_base_url = %target_base_url,
        port = config.port,
        "Starting http-forwarder"
    );

    let mut forwarder_config = ForwarderConfig::new(config.port, target_base_url);
    forwarder_config.buffer_size = config.buffer_size;

    let forwarder = Forwarder::start(forwarder_config).await?;

    info!(
        local_url = %format!("http://localhost:{}{}", forwarder.local_addr().port(), target_path),
        "Forwarder ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    forwarder.stop();
    forwarder.join().await;

    Ok(())
}
