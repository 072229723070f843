//! Stub asset for testing and development.
//!
//! An in-memory ledger with balances and allowances. Recipients can be
//! blocked and the next transfer can be forced to fail, which exercises the
//! exchange's escrow path.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use boxswap_domain::AccountId;

use crate::error::ExecError;
use crate::ports::AssetPort;

// =============================================================================
// Stub Asset
// =============================================================================

/// In-memory fungible asset.
pub struct StubAsset {
    symbol: String,
    balances: RwLock<HashMap<AccountId, u128>>,
    allowances: RwLock<HashMap<(AccountId, AccountId), u128>>,
    /// Recipients whose incoming transfers are rejected
    blocked: RwLock<HashSet<AccountId>>,
    /// Whether to simulate a failure on the next transfer
    fail_next: RwLock<bool>,
}

impl StubAsset {
    /// Create an empty ledger.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            balances: RwLock::new(HashMap::new()),
            allowances: RwLock::new(HashMap::new()),
            blocked: RwLock::new(HashSet::new()),
            fail_next: RwLock::new(false),
        }
    }

    /// Credit new units to an account.
    pub fn mint(&self, to: &AccountId, amount: u128) {
        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let balance = balances.entry(to.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Current balance (synchronous, for assertions).
    pub fn balance(&self, who: &AccountId) -> u128 {
        let balances = self.balances.read().unwrap_or_else(PoisonError::into_inner);
        balances.get(who).copied().unwrap_or(0)
    }

    /// Reject every transfer to `who` until unblocked.
    pub fn block(&self, who: &AccountId) {
        let mut blocked = self.blocked.write().unwrap_or_else(PoisonError::into_inner);
        blocked.insert(who.clone());
    }

    /// Accept transfers to `who` again.
    pub fn unblock(&self, who: &AccountId) {
        let mut blocked = self.blocked.write().unwrap_or_else(PoisonError::into_inner);
        blocked.remove(who);
    }

    /// Configure the next transfer to fail.
    pub fn set_fail_next(&self, fail: bool) {
        let mut fail_next = self.fail_next.write().unwrap_or_else(PoisonError::into_inner);
        *fail_next = fail;
    }

    /// Check if we should fail the next operation.
    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap_or_else(PoisonError::into_inner);
        let fail = *fail_next;
        *fail_next = false; // Reset after check
        fail
    }

    fn move_balance(&self, from: &AccountId, to: &AccountId, amount: u128) -> Result<(), ExecError> {
        if self.should_fail() {
            return Err(ExecError::TransferFailed(format!(
                "{}: simulated transfer failure",
                self.symbol
            )));
        }
        {
            let blocked = self.blocked.read().unwrap_or_else(PoisonError::into_inner);
            if blocked.contains(to) {
                return Err(ExecError::TransferFailed(format!(
                    "{}: recipient {} does not accept transfers",
                    self.symbol, to
                )));
            }
        }

        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(ExecError::TransferFailed(format!(
                "{}: {} holds {}, needs {}",
                self.symbol, from, available, amount
            )));
        }
        balances.insert(from.clone(), available - amount);
        let credited = balances.entry(to.clone()).or_insert(0);
        *credited = credited.saturating_add(amount);
        Ok(())
    }
}

#[async_trait]
impl AssetPort for StubAsset {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExecError> {
        self.move_balance(from, to, amount)
    }

    async fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), ExecError> {
        let key = (from.clone(), spender.clone());
        let allowed = {
            let allowances = self.allowances.read().unwrap_or_else(PoisonError::into_inner);
            allowances.get(&key).copied().unwrap_or(0)
        };
        if allowed < amount {
            return Err(ExecError::TransferFailed(format!(
                "{}: allowance {} of {} for {} below {}",
                self.symbol, allowed, from, spender, amount
            )));
        }

        self.move_balance(from, to, amount)?;

        let mut allowances = self.allowances.write().unwrap_or_else(PoisonError::into_inner);
        allowances.insert(key, allowed - amount);
        Ok(())
    }

    async fn balance_of(&self, who: &AccountId) -> Result<u128, ExecError> {
        Ok(self.balance(who))
    }

    async fn approve(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u128,
    ) -> Result<(), ExecError> {
        let mut allowances = self.allowances.write().unwrap_or_else(PoisonError::into_inner);
        allowances.insert((owner.clone(), spender.clone()), amount);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
