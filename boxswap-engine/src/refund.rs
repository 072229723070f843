//! Refund allocation under tolerance and secure caps.
//!
//! When the unconstrained clearing price leaves the tolerance band, limit
//! orders on the pushing side are refunded first, just enough to pin the
//! price to the band edge. If removing them entirely still leaves the price
//! outside the secure band, non-limit orders on that side are refunded too
//! and the price is pinned to the secure edge. Non-limit orders are never
//! refunded for tolerance alone.
//!
//! Rates are scaled by the fee factor: a rate equal to `fee_factor` refunds
//! the whole order including its fee.

use boxswap_domain::{
    BoxAggregates, Direction, Order, OrderCategory, Payout, Price, RefundRate, RefundRates,
    Reserves, SettlementPlan,
};
use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::{self, wide, WIDE_SCALE};
use crate::params::SettlementParams;
use crate::price::{executed_scaled, PoolTerms, PriceResolver};

/// Clearing price and per-category refund rates for one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Clearing price after caps
    pub price: Price,
    /// Refund rates in settlement order
    pub refund_rates: RefundRates,
}

/// Decides refund rates and derives per-order payouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefundAllocator {
    params: SettlementParams,
}

impl RefundAllocator {
    /// Create an allocator for the given parameters
    pub fn new(params: SettlementParams) -> Self {
        Self { params }
    }

    /// Compute the capped clearing price and refund rates
    pub fn allocate(&self, reserves: Reserves, aggregates: &BoxAggregates) -> EngineResult<Allocation> {
        let terms = PoolTerms::new(reserves, &self.params)?;
        let bands = PriceResolver::new(self.params).bands(reserves)?;

        let buy_nl = aggregates.buy_non_limit;
        let buy_l = aggregates.buy_limit;
        let sell_nl = aggregates.sell_non_limit;
        let sell_l = aggregates.sell_limit;
        let buy = buy_nl
            .checked_add(buy_l)
            .ok_or_else(|| EngineError::fault("buy total overflows"))?;
        let sell = sell_nl
            .checked_add(sell_l)
            .ok_or_else(|| EngineError::fault("sell total overflows"))?;

        let d = WIDE_SCALE;
        let fee = terms.fee;
        let full = RefundRate::from_scaled(self.params.fee_factor);
        let upper_tol = wide(bands.tolerance_upper);
        let lower_tol = wide(bands.tolerance_lower);
        let upper_sec = wide(bands.secure_upper);
        let lower_sec = wide(bands.secure_lower);

        let mut rates = RefundRates::default();
        let mut price = terms.price(buy, sell)?;

        if price > upper_tol {
            // sell pressure pushes the price up
            let without_limit = terms.price(buy, sell_nl)?;
            if without_limit <= upper_tol {
                let target = math::mul_div(upper_tol, terms.base_side(buy)?, d, "sell limit room")?;
                let room = target.saturating_sub(terms.settlement_side(sell_nl)?);
                rates.set(OrderCategory::SellLimit, partial_rate(sell_l, room, fee)?);
                price = upper_tol;
            } else {
                rates.set(OrderCategory::SellLimit, full);
                if without_limit <= upper_sec {
                    price = without_limit;
                } else {
                    let target =
                        math::mul_div(upper_sec, terms.base_side(buy)?, d, "sell room")?;
                    let room = target.saturating_sub(terms.settlement_fee);
                    rates.set(OrderCategory::SellNonLimit, partial_rate(sell_nl, room, fee)?);
                    price = upper_sec;
                }
            }
        } else if price < lower_tol {
            // buy pressure pushes the price down
            let without_limit = terms.price(buy_nl, sell)?;
            if without_limit >= lower_tol {
                let target =
                    math::mul_div(terms.settlement_side(sell)?, d, lower_tol, "buy limit room")?;
                let room = target.saturating_sub(terms.base_side(buy_nl)?);
                rates.set(OrderCategory::BuyLimit, partial_rate(buy_l, room, fee)?);
                price = lower_tol;
            } else {
                rates.set(OrderCategory::BuyLimit, full);
                if without_limit >= lower_sec {
                    price = without_limit;
                } else {
                    let target =
                        math::mul_div(terms.settlement_side(sell)?, d, lower_sec, "buy room")?;
                    let room = target.saturating_sub(terms.base_fee);
                    rates.set(OrderCategory::BuyNonLimit, partial_rate(buy_nl, room, fee)?);
                    price = lower_sec;
                }
            }
        }

        // an empty category has nothing to refund
        for category in OrderCategory::ALL {
            if aggregates.get(category) == 0 {
                rates.set(category, RefundRate::NONE);
            }
        }

        Ok(Allocation {
            price: Price::from_scaled(math::narrow(price, "clearing price")?),
            refund_rates: rates,
        })
    }

    /// Proceeds and refund owed to one order of a planned box
    ///
    /// Both amounts truncate; the remainder stays with the pool.
    pub fn payout(&self, order: &Order, plan: &SettlementPlan) -> EngineResult<Payout> {
        let direction = order.direction;
        let amount = order.amount_in;

        if plan.price.is_zero() {
            return Ok(Payout {
                proceeds: (direction.asset_out(), 0),
                refund: (direction.asset_in(), amount),
            });
        }

        let fee = wide(self.params.fee_factor);
        let d = WIDE_SCALE;
        let rate = plan.refund_rates.get(order.category()).scaled();
        let price = wide(plan.price.scaled());

        let refund = math::mul_div(wide(amount), wide(rate), fee, "refund")?;
        let executed = executed_scaled(amount, rate, fee)?;

        let proceeds = match direction {
            Direction::BaseToSettlement => math::mul_div(executed, price, fee, "buy proceeds")? / d,
            Direction::SettlementToBase => {
                let net = math::mul_div(executed, d, fee, "sell proceeds")?;
                math::mul_div(net, d, price, "sell proceeds")? / d
            }
        };

        Ok(Payout {
            proceeds: (direction.asset_out(), math::narrow(proceeds, "proceeds")?),
            refund: (direction.asset_in(), math::narrow(refund, "refund")?),
        })
    }
}

/// Refund rate leaving `room` (scaled by `D`) of `total` executed.
fn partial_rate(total: u128, room: U256, fee: U256) -> EngineResult<RefundRate> {
    let gross = math::mul(wide(total), WIDE_SCALE, "partial rate")?;
    if gross == U256::ZERO {
        return Ok(RefundRate::NONE);
    }
    let executed = room.min(gross);
    let rate = math::mul_div(gross - executed, fee, gross, "partial rate")?;
    Ok(RefundRate::from_scaled(math::narrow(rate, "partial rate")?))
}
