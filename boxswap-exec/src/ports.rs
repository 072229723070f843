//! Execution layer port definitions.
//!
//! Ports define the interfaces for external collaborators (fungible assets,
//! the window clock). Adapters implement these ports for specific backends
//! (in-memory ledger, system time, etc.).

use async_trait::async_trait;
use boxswap_domain::{AccountId, WindowId};

use crate::error::ExecError;

// =============================================================================
// Asset Port
// =============================================================================

/// Capability interface of a fungible asset.
///
/// Any asset implementing it is interchangeable. Implementations:
/// - `StubAsset` - in-memory ledger with failure injection
#[async_trait]
pub trait AssetPort: Send + Sync {
    /// Asset symbol, used in logs
    fn symbol(&self) -> &str;

    /// Move `amount` from `from` to `to`.
    ///
    /// `from` is the caller of the asset (the exchange when paying out).
    async fn transfer(&self, from: &AccountId, to: &AccountId, amount: u128)
        -> Result<(), ExecError>;

    /// Move `amount` from `from` to `to` using the allowance `from`
    /// granted to `spender`.
    async fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExecError>;

    /// Balance held by `who`
    async fn balance_of(&self, who: &AccountId) -> Result<u128, ExecError>;

    /// Set the allowance `owner` grants to `spender`
    async fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u128,
    ) -> Result<(), ExecError>;
}

// =============================================================================
// Window Clock
// =============================================================================

/// Source of the current box window.
///
/// Windows must never move backwards.
pub trait WindowClock: Send + Sync {
    /// Window at the time of the call
    fn current_window(&self) -> WindowId;
}
