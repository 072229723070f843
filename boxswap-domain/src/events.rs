//! Domain Events for BoxSwap
//!
//! Events describe what a single exchange call did. They are returned to the
//! caller as part of the call outcome and can be appended to an event log.

use crate::entities::{RefundRates, Reserves};
use crate::value_objects::{AccountId, AssetKind, BoxId, OrderCategory, Price, WindowId};
use serde::{Deserialize, Serialize};

/// Exchange events
///
/// Events are immutable records of state changes.
/// They serialize with a `type` tag so an event log stays self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeEvent {
    /// First liquidity provided, price ratio fixed
    ExchangeInitialized {
        /// Initial provider
        provider: AccountId,
        /// Base asset deposited
        #[serde(with = "crate::amount")]
        base_amount: u128,
        /// Settlement asset deposited
        #[serde(with = "crate::amount")]
        settlement_amount: u128,
        /// Shares minted
        #[serde(with = "crate::amount")]
        shares: u128,
    },

    /// Liquidity added proportionally
    LiquidityAdded {
        /// Provider
        provider: AccountId,
        /// Base asset deposited
        #[serde(with = "crate::amount")]
        base_amount: u128,
        /// Settlement asset deposited
        #[serde(with = "crate::amount")]
        settlement_amount: u128,
        /// Shares minted
        #[serde(with = "crate::amount")]
        shares: u128,
    },

    /// Liquidity withdrawn proportionally
    LiquidityRemoved {
        /// Provider
        provider: AccountId,
        /// Base asset withdrawn
        #[serde(with = "crate::amount")]
        base_amount: u128,
        /// Settlement asset withdrawn
        #[serde(with = "crate::amount")]
        settlement_amount: u128,
        /// Shares burned
        #[serde(with = "crate::amount")]
        shares: u128,
    },

    /// Order accepted into a box
    OrderPlaced {
        /// Box the order joined
        box_id: BoxId,
        /// Window of that box
        window: WindowId,
        /// Orderer
        orderer: AccountId,
        /// Category of the order
        category: OrderCategory,
        /// Amount paid in
        #[serde(with = "crate::amount")]
        amount_in: u128,
    },

    /// Settlement summary, emitted when a box starts settling
    SettlementStarted {
        /// Box being settled
        box_id: BoxId,
        /// Clearing price (zero for no trade)
        price: Price,
        /// Refund rates in settlement order
        refund_rates: RefundRates,
    },

    /// Pool reserves moved by a settlement or liquidity operation
    ReservesUpdated {
        /// New base reserve
        #[serde(with = "crate::amount")]
        base_reserve: u128,
        /// New settlement reserve
        #[serde(with = "crate::amount")]
        settlement_reserve: u128,
    },

    /// One order was paid out
    OrderSettled {
        /// Box of the order
        box_id: BoxId,
        /// Category of the order
        category: OrderCategory,
        /// Index within the category
        index: usize,
        /// Orderer
        orderer: AccountId,
        /// Proceeds in the other asset
        #[serde(with = "crate::amount")]
        proceeds: u128,
        /// Refund in the asset paid in
        #[serde(with = "crate::amount")]
        refund: u128,
    },

    /// A payout transfer failed and the amount was escrowed
    PayoutEscrowed {
        /// Beneficiary
        account: AccountId,
        /// Asset held
        asset: AssetKind,
        /// Amount held
        #[serde(with = "crate::amount")]
        amount: u128,
        /// Transfer failure reason
        reason: String,
    },

    /// A box could not be planned; every order was refunded in full
    SettlementFaulted {
        /// Box that was dropped
        box_id: BoxId,
        /// Arithmetic failure that prevented planning
        reason: String,
    },

    /// Every order of a box has been paid out
    BoxSettled {
        /// Box identifier
        box_id: BoxId,
    },

    /// Accrued protocol fees paid to the fee sink
    FeesSwept {
        /// Fee sink
        sink: AccountId,
        /// Base asset paid
        #[serde(with = "crate::amount")]
        base_amount: u128,
        /// Settlement asset paid
        #[serde(with = "crate::amount")]
        settlement_amount: u128,
    },

    /// Escrowed payouts claimed by their beneficiary
    EscrowClaimed {
        /// Beneficiary
        account: AccountId,
        /// Base asset paid
        #[serde(with = "crate::amount")]
        base_amount: u128,
        /// Settlement asset paid
        #[serde(with = "crate::amount")]
        settlement_amount: u128,
    },
}

impl ExchangeEvent {
    /// Event type name (matches the serialized tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            ExchangeEvent::ExchangeInitialized { .. } => "exchange_initialized",
            ExchangeEvent::LiquidityAdded { .. } => "liquidity_added",
            ExchangeEvent::LiquidityRemoved { .. } => "liquidity_removed",
            ExchangeEvent::OrderPlaced { .. } => "order_placed",
            ExchangeEvent::SettlementStarted { .. } => "settlement_started",
            ExchangeEvent::ReservesUpdated { .. } => "reserves_updated",
            ExchangeEvent::OrderSettled { .. } => "order_settled",
            ExchangeEvent::PayoutEscrowed { .. } => "payout_escrowed",
            ExchangeEvent::SettlementFaulted { .. } => "settlement_faulted",
            ExchangeEvent::BoxSettled { .. } => "box_settled",
            ExchangeEvent::FeesSwept { .. } => "fees_swept",
            ExchangeEvent::EscrowClaimed { .. } => "escrow_claimed",
        }
    }

    /// Reserves carried by the event, if any
    pub fn reserves(&self) -> Option<Reserves> {
        match self {
            ExchangeEvent::ReservesUpdated {
                base_reserve,
                settlement_reserve,
            } => Some(Reserves::new(*base_reserve, *settlement_reserve)),
            _ => None,
        }
    }
}
