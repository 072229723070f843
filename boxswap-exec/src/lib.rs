//! BoxSwap Execution Layer
//!
//! Exchange entry points, budgeted settlement and asset plumbing.
//!
//! # Architecture
//!
//! ```text
//! Entry point → Draft State → Scheduler/Engine → Pull Funds → Commit → Payouts
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for fungible assets and the window clock
//! - **State**: Pool, open boxes, cursor, fees and escrow of one exchange
//! - **Scheduler**: Resumable, budgeted settlement of sealed boxes
//! - **Exchange**: Non-reentrant, all-or-nothing entry points
//! - **Stub**: In-memory asset and manual clock for development
//!
//! # Example
//!
//! ```rust,ignore
//! use boxswap_exec::{BoxExchange, ExchangeConfig, ManualClock, StubAsset};
//! use std::sync::Arc;
//!
//! let base = Arc::new(StubAsset::new("BASE"));
//! let token = Arc::new(StubAsset::new("TKN"));
//! let clock = Arc::new(ManualClock::new(1));
//! let exchange = BoxExchange::new(config, base, token, clock)?;
//!
//! exchange.initialize_exchange(&lp, 20_000, 10_000).await?;
//! exchange.order_base_to_settlement(&trader, deadline, 200, false).await?;
//! ```

#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod exchange;
pub mod outcome;
pub mod ports;
pub mod scheduler;
pub mod state;
pub mod stub;

// Re-exports for convenience
pub use clock::{ManualClock, SystemClock};
pub use error::{ExecError, ExecResult};
pub use exchange::{BoxExchange, BoxSummary, ExchangeConfig};
pub use outcome::{CallOutcome, PlacedOrder, SettlementStatus};
pub use ports::{AssetPort, WindowClock};
pub use scheduler::{
    ExecutionScheduler, SettlementProgress, Transfer, DEFAULT_SETTLE_BUDGET,
};
pub use state::ExchangeState;
pub use stub::StubAsset;
