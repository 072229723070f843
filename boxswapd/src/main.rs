//! BoxSwap Daemon
//!
//! Batched constant-product exchange with an HTTP API and a settlement keeper.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p boxswapd
//!
//! # Start with custom environment
//! BOXSWAP_ENV=test BOXSWAP_API_PORT=8081 cargo run -p boxswapd
//! ```
//!
//! # Environment Variables
//!
//! - `BOXSWAP_ENV`: Environment (test, development, production)
//! - `BOXSWAP_API_HOST`: API host (default: 0.0.0.0)
//! - `BOXSWAP_API_PORT`: API port (default: 8080)
//! - `BOXSWAP_WINDOW_SECS`: Order window length (default: 15)
//! - `BOXSWAP_SETTLE_BUDGET`: Orders paid per call (default: 10)
//! - `BOXSWAP_FEE_RATE`: Trading fee (default: 0.003)
//! - `BOXSWAP_TOLERANCE_RATE`: Limit order tolerance (default: 0.001)
//! - `BOXSWAP_SECURE_RATE`: Maximum price move per box (default: 0.05)
//! - `BOXSWAP_LIEN_RATE`: Protocol fee share (default: 0.0006)
//! - `BOXSWAP_FEE_SINK`: Fee sink account (default: fee-sink)
//! - `BOXSWAP_KEEPER_INTERVAL_SECS`: Keeper period (default: 5)
//! - `BOXSWAP_LOG_JSON`: Log as JSON lines (default: false)

use boxswapd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first: it decides the log format
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("boxswapd=info".parse()?);
    if config.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        window_secs = config.exchange.window_secs,
        settle_budget = config.exchange.settle_budget,
        "BoxSwap Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config)?;
    daemon.run().await?;

    Ok(())
}
