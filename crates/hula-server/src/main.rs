//! # hula server
//!
//! Serves isomorphic components: full pages over plain HTTP, and rendered
//! fragments over a WebSocket call channel.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! hula
//!
//! # Run with environment variables
//! HULA_PORT=8080 HULA_HOST=0.0.0.0 HULA_ENVIRONMENT=production hula
//! ```
//!
//! Configuration is read from `hula.toml`, `/etc/hula/hula.toml` or
//! `~/.config/hula/hula.toml`, whichever exists first.

mod config;
mod demo;
mod handlers;
mod metrics;
mod page;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hula=debug,hula_core=debug,hula_transport=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!(
        "Starting hula server on {}:{} ({:?})",
        config.host,
        config.port,
        config.environment
    );

    metrics::init_metrics();

    handlers::run_server(config, demo::routes()).await?;

    Ok(())
}
