//! BoxSwap Daemon Library
//!
//! Runtime around the batched exchange: registry, persistence, HTTP API and
//! the settlement keeper.
//!
//! # Architecture
//!
//! ```text
//! HTTP API ─┐
//!           ├→ ExchangeFactory → BoxExchange → AssetPort ledgers
//! Keeper ───┘          │
//!                      └→ OutcomeRecorder → Store (events, snapshots)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use boxswapd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let daemon = Daemon::new_stub(Config::from_env()?)?;
//!     daemon.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod recorder;
pub mod registry;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, ExchangeSettings};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use recorder::OutcomeRecorder;
pub use registry::{custody_account, ExchangeFactory, ExchangeHandle, BASE_SYMBOL};
