//! # Rendezvous
//!
//! Room signaling server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! rendezvous
//!
//! # Run with a specific config file
//! RENDEZVOUS_CONFIG=/path/to/rendezvous.toml rendezvous
//!
//! # Override individual settings
//! RENDEZVOUS_PORT=8080 RENDEZVOUS_HOST=0.0.0.0 RENDEZVOUS_LIMITS__MAX_ROOMS=500 rendezvous
//! ```

use anyhow::Result;
use rendezvous_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Starting Rendezvous server on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
