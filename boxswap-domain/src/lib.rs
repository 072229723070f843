//! BoxSwap Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains orders, boxes, settlement plans, value objects and events.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod amount;
pub mod entities;
pub mod events;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    BoxAggregates, EscrowBalance, LienAccrual, Order, OrderBox, Payout, RefundRates, Reserves,
    SettlementCursor, SettlementPlan,
};
pub use events::ExchangeEvent;
pub use value_objects::{
    AccountId, AssetId, AssetKind, BoxId, Direction, DomainError, OrderCategory, Price,
    RefundRate, WindowId, SCALE,
};
