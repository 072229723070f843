//! Liquidity pool: reserves and provider shares.
//!
//! Shares are 18-decimal fixed point. The first provider receives
//! `INITIAL_SHARES` and fixes the price ratio; later providers mint shares
//! in proportion to the base asset they contribute.

use std::collections::BTreeMap;

use boxswap_domain::{AccountId, Reserves};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::{self, wide, SCALE};

/// Shares minted by `initialize`.
pub const INITIAL_SHARES: u128 = 1000 * SCALE;

/// Amounts moved and shares minted or burned by a liquidity operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityChange {
    /// Base asset moved
    #[serde(with = "boxswap_domain::amount")]
    pub base: u128,
    /// Settlement asset moved
    #[serde(with = "boxswap_domain::amount")]
    pub settlement: u128,
    /// Shares minted or burned
    #[serde(with = "boxswap_domain::amount")]
    pub shares: u128,
}

/// Reserve state and share ledger of one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPool {
    reserves: Reserves,
    #[serde(with = "boxswap_domain::amount")]
    total_shares: u128,
    #[serde(with = "boxswap_domain::amount::map")]
    shares: BTreeMap<AccountId, u128>,
}

impl LiquidityPool {
    /// Create an empty, uninitialized pool
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the first provider has deposited
    pub fn is_initialized(&self) -> bool {
        self.total_shares > 0
    }

    /// Current reserves
    pub fn reserves(&self) -> Reserves {
        self.reserves
    }

    /// Total shares outstanding
    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    /// Shares held by one provider
    pub fn shares_of(&self, account: &AccountId) -> u128 {
        self.shares.get(account).copied().unwrap_or(0)
    }

    /// `floor(sqrt(base · settlement))`, the geometric depth of the pool
    pub fn invariant_root(&self) -> EngineResult<u128> {
        let product = math::mul(wide(self.reserves.base), wide(self.reserves.settlement), "k")?;
        math::narrow(math::sqrt(product), "invariant root")
    }

    /// First deposit. Mints `INITIAL_SHARES` to the provider.
    pub fn initialize(
        &mut self,
        provider: &AccountId,
        settlement_amount: u128,
        base_amount: u128,
    ) -> EngineResult<LiquidityChange> {
        if self.is_initialized() {
            return Err(EngineError::AlreadyInitialized);
        }
        if settlement_amount == 0 || base_amount == 0 {
            return Err(EngineError::InvalidAmount(
                "initial deposit must be positive on both sides".to_string(),
            ));
        }

        self.reserves = Reserves::new(base_amount, settlement_amount);
        self.total_shares = INITIAL_SHARES;
        self.shares.insert(provider.clone(), INITIAL_SHARES);

        Ok(LiquidityChange {
            base: base_amount,
            settlement: settlement_amount,
            shares: INITIAL_SHARES,
        })
    }

    /// Shares minted and settlement asset required for a base deposit
    ///
    /// The settlement side rounds up so the pool never loses to rounding.
    pub fn quote_add(&self, base_amount: u128) -> EngineResult<LiquidityChange> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        if base_amount == 0 {
            return Err(EngineError::InvalidAmount("deposit must be positive".to_string()));
        }
        let base_reserve = wide(self.reserves.base);
        let shares = math::mul_div(wide(self.total_shares), wide(base_amount), base_reserve, "shares")?;
        let settlement = math::mul_div_up(
            wide(self.reserves.settlement),
            wide(base_amount),
            base_reserve,
            "settlement deposit",
        )?;

        let shares = math::narrow(shares, "shares")?;
        if shares == 0 {
            return Err(EngineError::InvalidAmount(
                "deposit too small to mint a share unit".to_string(),
            ));
        }

        Ok(LiquidityChange {
            base: base_amount,
            settlement: math::narrow(settlement, "settlement deposit")?,
            shares,
        })
    }

    /// Proportional deposit
    ///
    /// # Errors
    /// `SlippageExceeded` if fewer than `min_shares` would be minted
    pub fn add_liquidity(
        &mut self,
        provider: &AccountId,
        min_shares: u128,
        base_amount: u128,
    ) -> EngineResult<LiquidityChange> {
        let change = self.quote_add(base_amount)?;
        if change.shares < min_shares {
            return Err(EngineError::SlippageExceeded(format!(
                "would mint {} shares, minimum {}",
                change.shares, min_shares
            )));
        }

        let reserves = Reserves::new(
            checked_add(self.reserves.base, change.base, "base reserve")?,
            checked_add(self.reserves.settlement, change.settlement, "settlement reserve")?,
        );
        let total_shares = checked_add(self.total_shares, change.shares, "total shares")?;
        let held = checked_add(self.shares_of(provider), change.shares, "provider shares")?;

        self.reserves = reserves;
        self.total_shares = total_shares;
        self.shares.insert(provider.clone(), held);
        Ok(change)
    }

    /// Proportional withdrawal
    ///
    /// # Errors
    /// - `InsufficientShares` if `shares` exceeds the provider's balance
    /// - `SlippageExceeded` if either output is below its minimum
    /// - `ArithmeticFault` if a reserve would reach zero
    pub fn remove_liquidity(
        &mut self,
        provider: &AccountId,
        min_base: u128,
        min_settlement: u128,
        shares: u128,
    ) -> EngineResult<LiquidityChange> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        if shares == 0 {
            return Err(EngineError::InvalidAmount("must burn a positive share amount".to_string()));
        }
        let available = self.shares_of(provider);
        if shares > available {
            return Err(EngineError::InsufficientShares {
                requested: shares,
                available,
            });
        }

        let total = wide(self.total_shares);
        let base_out = math::narrow(
            math::mul_div(wide(self.reserves.base), wide(shares), total, "base out")?,
            "base out",
        )?;
        let settlement_out = math::narrow(
            math::mul_div(wide(self.reserves.settlement), wide(shares), total, "settlement out")?,
            "settlement out",
        )?;

        if base_out < min_base || settlement_out < min_settlement {
            return Err(EngineError::SlippageExceeded(format!(
                "withdrawal ({}, {}) below minimum ({}, {})",
                base_out, settlement_out, min_base, min_settlement
            )));
        }

        let base_left = self.reserves.base - base_out;
        let settlement_left = self.reserves.settlement - settlement_out;
        if base_left == 0 || settlement_left == 0 {
            return Err(EngineError::fault("withdrawal would empty a reserve"));
        }

        self.reserves = Reserves::new(base_left, settlement_left);
        self.total_shares -= shares;
        let remaining = available - shares;
        if remaining == 0 {
            self.shares.remove(provider);
        } else {
            self.shares.insert(provider.clone(), remaining);
        }

        Ok(LiquidityChange {
            base: base_out,
            settlement: settlement_out,
            shares,
        })
    }

    /// Move reserves to the state computed by a settlement plan
    pub fn apply_settlement(&mut self, reserves: Reserves) -> EngineResult<()> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        if reserves.base == 0 || reserves.settlement == 0 {
            return Err(EngineError::fault("settlement would empty a reserve"));
        }
        self.reserves = reserves;
        Ok(())
    }
}

fn checked_add(a: u128, b: u128, context: &str) -> EngineResult<u128> {
    a.checked_add(b)
        .ok_or_else(|| EngineError::fault(format!("{}: overflow", context)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ETH: u128 = SCALE;

    fn lp(name: &str) -> AccountId {
        AccountId::new(name).unwrap()
    }

    #[test]
    fn test_initialize_mints_initial_shares() {
        let mut pool = LiquidityPool::new();
        let change = pool.initialize(&lp("lp1"), 20_000, ETH).unwrap();

        assert_eq!(change.shares, 1000 * SCALE);
        assert_eq!(pool.total_shares(), 1000 * SCALE);
        assert_eq!(pool.shares_of(&lp("lp1")), 1000 * SCALE);
        assert_eq!(pool.reserves(), Reserves::new(ETH, 20_000));
    }

    #[test]
    fn test_initialize_twice_rejected() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 20_000, ETH).unwrap();
        assert_eq!(
            pool.initialize(&lp("lp2"), 20_000, ETH),
            Err(EngineError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_remove_then_add_restores_shares() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 40_000, 2 * ETH).unwrap();

        let removed = pool
            .remove_liquidity(&lp("lp1"), 1000, 2000, 500 * SCALE)
            .unwrap();
        assert_eq!(removed.base, ETH);
        assert_eq!(removed.settlement, 20_000);
        assert_eq!(pool.shares_of(&lp("lp1")), 500 * SCALE);

        let added = pool.add_liquidity(&lp("lp2"), 50, ETH).unwrap();
        assert_eq!(added.shares, 500 * SCALE);
        assert_eq!(added.settlement, 20_000);
        assert_eq!(pool.total_shares(), 1000 * SCALE);
        assert_eq!(pool.reserves(), Reserves::new(2 * ETH, 40_000));
    }

    #[test]
    fn test_add_then_remove_round_trips_modulo_rounding() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 10_007, 30_011).unwrap();
        let before = pool.clone();

        let added = pool.add_liquidity(&lp("lp2"), 0, 1_234).unwrap();
        let removed = pool
            .remove_liquidity(&lp("lp2"), 0, 0, added.shares)
            .unwrap();

        assert_eq!(pool.total_shares(), before.total_shares());
        assert!(removed.base <= added.base);
        assert!(removed.settlement <= added.settlement);
        assert!(pool.reserves().base >= before.reserves().base);
        assert!(pool.reserves().settlement >= before.reserves().settlement);
        assert!(pool.reserves().base - before.reserves().base <= 1);
        assert!(pool.reserves().settlement - before.reserves().settlement <= 1);
    }

    #[test]
    fn test_add_slippage() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 20_000, ETH).unwrap();

        let result = pool.add_liquidity(&lp("lp2"), 501 * SCALE, ETH / 2);
        assert!(matches!(result, Err(EngineError::SlippageExceeded(_))));
        assert_eq!(pool.total_shares(), 1000 * SCALE);
    }

    #[test]
    fn test_remove_insufficient_shares() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 20_000, ETH).unwrap();

        let result = pool.remove_liquidity(&lp("lp2"), 0, 0, 1);
        assert_eq!(
            result,
            Err(EngineError::InsufficientShares {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_remove_slippage() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 20_000, ETH).unwrap();

        let result = pool.remove_liquidity(&lp("lp1"), 0, 10_001, 500 * SCALE);
        assert!(matches!(result, Err(EngineError::SlippageExceeded(_))));
    }

    #[test]
    fn test_remove_everything_is_fault() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 20_000, ETH).unwrap();

        let result = pool.remove_liquidity(&lp("lp1"), 0, 0, 1000 * SCALE);
        assert!(matches!(result, Err(EngineError::ArithmeticFault(_))));
    }

    #[test]
    fn test_invariant_root() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 100, 400).unwrap();
        assert_eq!(pool.invariant_root().unwrap(), 200);
    }

    #[test]
    fn test_apply_settlement_rejects_empty_reserve() {
        let mut pool = LiquidityPool::new();
        pool.initialize(&lp("lp1"), 100, 400).unwrap();
        assert!(pool.apply_settlement(Reserves::new(0, 5)).is_err());
        pool.apply_settlement(Reserves::new(399, 101)).unwrap();
        assert_eq!(pool.reserves(), Reserves::new(399, 101));
    }
}
