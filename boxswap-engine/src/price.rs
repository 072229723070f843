//! Clearing price and post-trade reserves.
//!
//! Every order pays the trading fee before meeting the pool, so a buy flow
//! `B` counts as `B / F` base units and a sell flow `S` as `S / F` settlement
//! units. Scaling both sides by `F` gives the clearing price
//!
//! ```text
//! P = (T·F + S·D) · D / (E·F + B·D)
//! ```
//!
//! with `E`, `T` the reserves, `D` the scale and `F` the fee factor. Buys and
//! sells settle against each other at `P`; only the imbalance moves the pool.

use boxswap_domain::{BoxAggregates, LienAccrual, OrderCategory, Price, RefundRates, Reserves};
use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::{self, wide, WIDE_SCALE};
use crate::params::SettlementParams;

// =============================================================================
// Price Bands
// =============================================================================

/// Reference price and the tolerance and secure bands around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBands {
    /// `T·D / E` before the box trades
    #[serde(with = "boxswap_domain::amount")]
    pub reference: u128,
    /// Highest price limit sells accept
    #[serde(with = "boxswap_domain::amount")]
    pub tolerance_upper: u128,
    /// Lowest price limit buys accept
    #[serde(with = "boxswap_domain::amount")]
    pub tolerance_lower: u128,
    /// Highest price any settlement may reach
    #[serde(with = "boxswap_domain::amount")]
    pub secure_upper: u128,
    /// Lowest price any settlement may reach
    #[serde(with = "boxswap_domain::amount")]
    pub secure_lower: u128,
}

// =============================================================================
// Pool Terms
// =============================================================================

/// Fee-scaled reserve terms shared by the resolver and the allocator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolTerms {
    /// `E·F`
    pub base_fee: U256,
    /// `T·F`
    pub settlement_fee: U256,
    /// `D`
    pub scale: U256,
    /// `F`
    pub fee: U256,
}

impl PoolTerms {
    pub fn new(reserves: Reserves, params: &SettlementParams) -> EngineResult<Self> {
        if reserves.base == 0 || reserves.settlement == 0 {
            return Err(EngineError::fault("pool reserves must be positive"));
        }
        let fee = wide(params.fee_factor);
        Ok(Self {
            base_fee: math::mul(wide(reserves.base), fee, "E*F")?,
            settlement_fee: math::mul(wide(reserves.settlement), fee, "T*F")?,
            scale: WIDE_SCALE,
            fee,
        })
    }

    /// `E·F + B·D`
    pub fn base_side(&self, buy_in: u128) -> EngineResult<U256> {
        math::add(
            self.base_fee,
            math::mul(wide(buy_in), self.scale, "B*D")?,
            "E*F + B*D",
        )
    }

    /// `T·F + S·D`
    pub fn settlement_side(&self, sell_in: u128) -> EngineResult<U256> {
        math::add(
            self.settlement_fee,
            math::mul(wide(sell_in), self.scale, "S*D")?,
            "T*F + S*D",
        )
    }

    /// Clearing price for raw buy and sell totals
    pub fn price(&self, buy_in: u128, sell_in: u128) -> EngineResult<U256> {
        math::mul_div(
            self.settlement_side(sell_in)?,
            self.scale,
            self.base_side(buy_in)?,
            "clearing price",
        )
    }
}

/// Executed part of `total` at refund rate `rate`, scaled by `D`.
pub(crate) fn executed_scaled(total: u128, rate: u128, fee: U256) -> EngineResult<U256> {
    let gross = math::mul(wide(total), WIDE_SCALE, "executed")?;
    let refunded = math::mul_div(gross, wide(rate), fee, "executed refund")?;
    math::sub(gross, refunded, "executed")
}

// =============================================================================
// Price Resolver
// =============================================================================

/// Computes clearing prices and the pool state after a box trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceResolver {
    params: SettlementParams,
}

impl PriceResolver {
    /// Create a resolver for the given parameters
    pub fn new(params: SettlementParams) -> Self {
        Self { params }
    }

    /// Parameters in use
    pub fn params(&self) -> &SettlementParams {
        &self.params
    }

    /// `T·D / E`
    pub fn reference_price(&self, reserves: Reserves) -> EngineResult<Price> {
        if reserves.base == 0 {
            return Err(EngineError::fault("base reserve is zero"));
        }
        let price = math::mul_div(
            wide(reserves.settlement),
            WIDE_SCALE,
            wide(reserves.base),
            "reference price",
        )?;
        Ok(Price::from_scaled(math::narrow(price, "reference price")?))
    }

    /// Tolerance and secure bands around the reference price
    pub fn bands(&self, reserves: Reserves) -> EngineResult<PriceBands> {
        let reference = wide(self.reference_price(reserves)?.scaled());
        let two = wide(2 * math::SCALE);
        let band = |rate: u128, label: &str| -> EngineResult<u128> {
            math::narrow(math::mul_div(reference, wide(rate), WIDE_SCALE, label)?, label)
        };

        Ok(PriceBands {
            reference: math::narrow(reference, "reference")?,
            tolerance_upper: band(self.params.tolerance_rate, "tolerance upper")?,
            tolerance_lower: band(
                math::narrow(math::sub(two, wide(self.params.tolerance_rate), "band")?, "band")?,
                "tolerance lower",
            )?,
            secure_upper: band(self.params.secure_rate, "secure upper")?,
            secure_lower: band(
                math::narrow(math::sub(two, wide(self.params.secure_rate), "band")?, "band")?,
                "secure lower",
            )?,
        })
    }

    /// Clearing price if every order of both sides executed
    pub fn price_for_flow(
        &self,
        reserves: Reserves,
        buy_in: u128,
        sell_in: u128,
    ) -> EngineResult<Price> {
        let terms = PoolTerms::new(reserves, &self.params)?;
        let price = terms.price(buy_in, sell_in)?;
        Ok(Price::from_scaled(math::narrow(price, "clearing price")?))
    }

    /// Reserves and lien after the executed parts of a box cross the pool
    ///
    /// Buyers receive `bex·P/F` settlement units and sellers `sex·D/F·D/P`
    /// base units, where `bex` and `sex` are the executed totals. The lien
    /// is `lien_rate / F` of each executed total and leaves the pool too.
    ///
    /// # Errors
    /// `ArithmeticFault` if a reserve would reach zero or go negative.
    pub fn reserves_after(
        &self,
        reserves: Reserves,
        aggregates: &BoxAggregates,
        price: Price,
        rates: &RefundRates,
    ) -> EngineResult<(Reserves, LienAccrual)> {
        let fee = wide(self.params.fee_factor);
        let d = WIDE_SCALE;
        let p = wide(price.scaled());

        let mut buy_executed = U256::ZERO;
        let mut sell_executed = U256::ZERO;
        for category in OrderCategory::ALL {
            let executed =
                executed_scaled(aggregates.get(category), rates.get(category).scaled(), fee)?;
            match category {
                OrderCategory::BuyNonLimit | OrderCategory::BuyLimit => {
                    buy_executed = math::add(buy_executed, executed, "buy executed")?
                }
                OrderCategory::SellNonLimit | OrderCategory::SellLimit => {
                    sell_executed = math::add(sell_executed, executed, "sell executed")?
                }
            }
        }

        let settlement_out = math::mul_div(buy_executed, p, fee, "settlement out")?;
        let base_out = if sell_executed == U256::ZERO {
            U256::ZERO
        } else {
            let net = math::mul_div(sell_executed, d, fee, "sell net")?;
            math::mul_div(net, d, p, "base out")?
        };

        let lien_rate = wide(self.params.lien_rate);
        let lien_base = math::mul_div(buy_executed, lien_rate, fee, "base lien")?;
        let lien_settlement = math::mul_div(sell_executed, lien_rate, fee, "settlement lien")?;

        let base = math::add(
            math::mul(wide(reserves.base), d, "base reserve")?,
            buy_executed,
            "base reserve",
        )?;
        let base = math::sub(base, base_out, "base reserve")?;
        let base = math::sub(base, lien_base, "base reserve")? / d;

        let settlement = math::add(
            math::mul(wide(reserves.settlement), d, "settlement reserve")?,
            sell_executed,
            "settlement reserve",
        )?;
        let settlement = math::sub(settlement, settlement_out, "settlement reserve")?;
        let settlement = math::sub(settlement, lien_settlement, "settlement reserve")? / d;

        let after = Reserves::new(
            math::narrow(base, "base reserve")?,
            math::narrow(settlement, "settlement reserve")?,
        );
        if after.base == 0 || after.settlement == 0 {
            return Err(EngineError::fault(format!(
                "settlement would deplete the pool ({}, {})",
                after.base, after.settlement
            )));
        }

        let lien = LienAccrual {
            base_owed: math::narrow(lien_base / d, "base lien")?,
            settlement_owed: math::narrow(lien_settlement / d, "settlement lien")?,
        };
        Ok((after, lien))
    }
}

// =============================================================================
// Tests
// =============================================================================
