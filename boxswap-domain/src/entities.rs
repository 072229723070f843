//! Domain Entities for BoxSwap
//!
//! Orders, the per-window order box, the settlement plan computed for a box,
//! and the cursor that tracks how far settlement has progressed.

use crate::value_objects::{
    AccountId, AssetKind, BoxId, Direction, DomainError, OrderCategory, Price, RefundRate,
    WindowId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Order
// =============================================================================

/// A submitted order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Who receives proceeds and refunds
    pub orderer: AccountId,
    /// Amount paid in, in units of the direction's input asset
    #[serde(with = "crate::amount")]
    pub amount_in: u128,
    /// Whether the order is tolerance-protected
    pub is_limit: bool,
    /// Buy or sell
    pub direction: Direction,
    /// Box the order was accumulated into
    pub box_id: BoxId,
}

impl Order {
    /// Create a new order
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if `amount_in` is zero
    pub fn new(
        orderer: AccountId,
        amount_in: u128,
        is_limit: bool,
        direction: Direction,
        box_id: BoxId,
    ) -> Result<Self, DomainError> {
        if amount_in == 0 {
            return Err(DomainError::InvalidAmount(
                "Order amount must be positive".to_string(),
            ));
        }
        Ok(Self {
            orderer,
            amount_in,
            is_limit,
            direction,
            box_id,
        })
    }

    /// Category this order settles in
    pub fn category(&self) -> OrderCategory {
        self.direction.category(self.is_limit)
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Running totals of `amount_in` per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxAggregates {
    /// Sum of non-limit buy amounts (base asset)
    #[serde(with = "crate::amount")]
    pub buy_non_limit: u128,
    /// Sum of limit buy amounts (base asset)
    #[serde(with = "crate::amount")]
    pub buy_limit: u128,
    /// Sum of non-limit sell amounts (settlement asset)
    #[serde(with = "crate::amount")]
    pub sell_non_limit: u128,
    /// Sum of limit sell amounts (settlement asset)
    #[serde(with = "crate::amount")]
    pub sell_limit: u128,
}

impl BoxAggregates {
    /// Build aggregates from the four totals in settlement order
    pub fn new(buy_non_limit: u128, buy_limit: u128, sell_non_limit: u128, sell_limit: u128) -> Self {
        Self {
            buy_non_limit,
            buy_limit,
            sell_non_limit,
            sell_limit,
        }
    }

    /// Total of one category
    pub fn get(&self, category: OrderCategory) -> u128 {
        match category {
            OrderCategory::BuyNonLimit => self.buy_non_limit,
            OrderCategory::BuyLimit => self.buy_limit,
            OrderCategory::SellNonLimit => self.sell_non_limit,
            OrderCategory::SellLimit => self.sell_limit,
        }
    }

    fn slot(&mut self, category: OrderCategory) -> &mut u128 {
        match category {
            OrderCategory::BuyNonLimit => &mut self.buy_non_limit,
            OrderCategory::BuyLimit => &mut self.buy_limit,
            OrderCategory::SellNonLimit => &mut self.sell_non_limit,
            OrderCategory::SellLimit => &mut self.sell_limit,
        }
    }

    /// Add an amount to a category
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if the total would overflow
    pub fn add(&mut self, category: OrderCategory, amount: u128) -> Result<(), DomainError> {
        let slot = self.slot(category);
        *slot = slot.checked_add(amount).ok_or_else(|| {
            DomainError::InvalidAmount(format!("{} total overflows", category))
        })?;
        Ok(())
    }

    /// Base asset paid in by all buys
    pub fn total_buy(&self) -> u128 {
        self.buy_non_limit.saturating_add(self.buy_limit)
    }

    /// Settlement asset paid in by all sells
    pub fn total_sell(&self) -> u128 {
        self.sell_non_limit.saturating_add(self.sell_limit)
    }

    /// True when no order has been accumulated
    pub fn is_empty(&self) -> bool {
        self.total_buy() == 0 && self.total_sell() == 0
    }
}

// =============================================================================
// Settlement Plan
// =============================================================================

/// Refund rates for the four categories, in settlement order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRates(pub [RefundRate; 4]);

impl RefundRates {
    /// Rate of one category
    pub fn get(&self, category: OrderCategory) -> RefundRate {
        self.0[category.index()]
    }

    /// Replace the rate of one category
    pub fn set(&mut self, category: OrderCategory, rate: RefundRate) {
        self.0[category.index()] = rate;
    }
}

/// Protocol fee accumulator, drained by a sweep to the fee sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LienAccrual {
    /// Base asset owed to the fee sink
    #[serde(with = "crate::amount")]
    pub base_owed: u128,
    /// Settlement asset owed to the fee sink
    #[serde(with = "crate::amount")]
    pub settlement_owed: u128,
}

impl LienAccrual {
    /// Fold another accrual into this one
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` on overflow
    pub fn accrue(&mut self, other: LienAccrual) -> Result<(), DomainError> {
        self.base_owed = self
            .base_owed
            .checked_add(other.base_owed)
            .ok_or_else(|| DomainError::InvalidAmount("base lien overflows".to_string()))?;
        self.settlement_owed = self
            .settlement_owed
            .checked_add(other.settlement_owed)
            .ok_or_else(|| DomainError::InvalidAmount("settlement lien overflows".to_string()))?;
        Ok(())
    }

    /// True when nothing is owed
    pub fn is_empty(&self) -> bool {
        self.base_owed == 0 && self.settlement_owed == 0
    }
}

/// Pool reserves at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    /// Base asset reserve
    #[serde(with = "crate::amount")]
    pub base: u128,
    /// Settlement asset reserve
    #[serde(with = "crate::amount")]
    pub settlement: u128,
}

impl Reserves {
    /// Build a reserve pair
    pub fn new(base: u128, settlement: u128) -> Self {
        Self { base, settlement }
    }
}

/// Everything decided for a box when it starts settling.
///
/// The pool is moved to `reserves_after` immediately; per-order payouts
/// are then derived from `price` and `refund_rates` as the cursor advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    /// Clearing price (zero when the box had no flow)
    pub price: Price,
    /// Per-category refund rates
    pub refund_rates: RefundRates,
    /// Reserves after the box's net flow crosses the pool
    pub reserves_after: Reserves,
    /// Protocol fees retained from the executed volume
    pub lien: LienAccrual,
}

impl SettlementPlan {
    /// Plan for a box with no flow: no trade, reserves untouched
    pub fn no_trade(reserves: Reserves) -> Self {
        Self {
            price: Price::zero(),
            refund_rates: RefundRates::default(),
            reserves_after: reserves,
            lien: LienAccrual::default(),
        }
    }
}

/// What one order receives once its box settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    /// Asset and amount received for the executed part
    pub proceeds: (AssetKind, u128),
    /// Asset and amount returned for the refunded part
    pub refund: (AssetKind, u128),
}

// =============================================================================
// Order Box
// =============================================================================

/// All orders accumulated during one time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBox {
    /// Box identifier
    pub id: BoxId,
    /// Window the box accumulates
    pub window: WindowId,
    aggregates: BoxAggregates,
    orders: [Vec<Order>; 4],
    plan: Option<SettlementPlan>,
    settled: bool,
}

impl OrderBox {
    /// Open an empty box for a window
    pub fn new(id: BoxId, window: WindowId) -> Self {
        Self {
            id,
            window,
            aggregates: BoxAggregates::default(),
            orders: Default::default(),
            plan: None,
            settled: false,
        }
    }

    /// Append an order, returning its index within its category
    ///
    /// # Errors
    /// - `BoxMismatch` if the order targets another box
    /// - `InvalidStateTransition` once settlement has started
    /// - `InvalidAmount` for a zero amount or an overflowing total
    pub fn push(&mut self, order: Order) -> Result<usize, DomainError> {
        if order.box_id != self.id {
            return Err(DomainError::BoxMismatch(format!(
                "order for box {} pushed into box {}",
                order.box_id, self.id
            )));
        }
        if self.plan.is_some() || self.settled {
            return Err(DomainError::InvalidStateTransition(format!(
                "box {} is already settling",
                self.id
            )));
        }
        if order.amount_in == 0 {
            return Err(DomainError::InvalidAmount(
                "Order amount must be positive".to_string(),
            ));
        }

        let category = order.category();
        self.aggregates.add(category, order.amount_in)?;
        let slot = &mut self.orders[category.index()];
        slot.push(order);
        Ok(slot.len() - 1)
    }

    /// Aggregated totals
    pub fn aggregates(&self) -> BoxAggregates {
        self.aggregates
    }

    /// Total of one category
    pub fn category_total(&self, category: OrderCategory) -> u128 {
        self.aggregates.get(category)
    }

    /// Orders of one category in insertion order
    pub fn orders_of(&self, category: OrderCategory) -> &[Order] {
        &self.orders[category.index()]
    }

    /// One order by category and index
    pub fn order(&self, category: OrderCategory, index: usize) -> Option<&Order> {
        self.orders[category.index()].get(index)
    }

    /// Number of orders across all categories
    pub fn order_count(&self) -> usize {
        self.orders.iter().map(Vec::len).sum()
    }

    /// A box is sealed once its window lies in the past
    pub fn is_sealed(&self, current: WindowId) -> bool {
        self.window < current
    }

    /// Plan computed when settlement started
    pub fn plan(&self) -> Option<&SettlementPlan> {
        self.plan.as_ref()
    }

    /// Record the settlement plan. Allowed exactly once.
    pub fn begin_settlement(&mut self, plan: SettlementPlan) -> Result<(), DomainError> {
        if self.plan.is_some() {
            return Err(DomainError::InvalidStateTransition(format!(
                "box {} already has a settlement plan",
                self.id
            )));
        }
        self.plan = Some(plan);
        Ok(())
    }

    /// Mark every payout as done
    pub fn mark_settled(&mut self) -> Result<(), DomainError> {
        if self.plan.is_none() {
            return Err(DomainError::InvalidStateTransition(format!(
                "box {} settled without a plan",
                self.id
            )));
        }
        self.settled = true;
        Ok(())
    }

    /// True once every payout has been made
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

// =============================================================================
// Settlement Cursor
// =============================================================================

/// Position of the next payout within a settling box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementCursor {
    /// Box being paid out
    pub box_id: BoxId,
    /// Category being paid out
    pub category: OrderCategory,
    /// Index of the next order within the category
    pub index: usize,
}

impl SettlementCursor {
    /// Cursor at the first order of a box
    pub fn start(box_id: BoxId) -> Self {
        Self {
            box_id,
            category: OrderCategory::BuyNonLimit,
            index: 0,
        }
    }
}

/// Amounts held for an account whose payout transfer failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowBalance {
    /// Base asset held
    #[serde(with = "crate::amount")]
    pub base: u128,
    /// Settlement asset held
    #[serde(with = "crate::amount")]
    pub settlement: u128,
}

impl EscrowBalance {
    /// Amount held in one asset
    pub fn get(&self, asset: AssetKind) -> u128 {
        match asset {
            AssetKind::Base => self.base,
            AssetKind::Settlement => self.settlement,
        }
    }

    /// Credit an amount in one asset
    pub fn credit(&mut self, asset: AssetKind, amount: u128) {
        // bounded by the exchange's own holdings, which are u128
        match asset {
            AssetKind::Base => self.base = self.base.saturating_add(amount),
            AssetKind::Settlement => self.settlement = self.settlement.saturating_add(amount),
        }
    }

    /// True when nothing is held
    pub fn is_empty(&self) -> bool {
        self.base == 0 && self.settlement == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
