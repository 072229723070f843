//! BoxSwap Engine Layer
//!
//! Pure settlement logic, deterministic, no I/O.
//! Takes pool reserves and box aggregates → returns a settlement plan.
//!
//! # Components
//!
//! - **math**: 18-decimal fixed point on 256-bit intermediates
//! - **price**: clearing price and post-trade reserves
//! - **refund**: tolerance and secure caps, per-order payouts
//! - **pool**: reserves and provider shares
//! - **settlement**: one plan per sealed box

#![warn(clippy::all)]

pub mod error;
pub mod math;
pub mod params;
pub mod pool;
pub mod price;
pub mod refund;
pub mod settlement;

// Re-exports for convenience
pub use error::{EngineError, EngineResult};
pub use params::SettlementParams;
pub use pool::{LiquidityChange, LiquidityPool, INITIAL_SHARES};
pub use price::{PriceBands, PriceResolver};
pub use refund::{Allocation, RefundAllocator};
pub use settlement::SettlementEngine;
