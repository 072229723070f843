//! Structured result of one exchange call.

use boxswap_domain::{
    BoxId, ExchangeEvent, OrderCategory, Price, RefundRates, Reserves, SettlementCursor, WindowId,
};
use boxswap_engine::LiquidityChange;
use serde::{Deserialize, Serialize};

/// Where a submitted order landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    /// Box the order joined
    pub box_id: BoxId,
    /// Window of that box
    pub window: WindowId,
    /// Category of the order
    pub category: OrderCategory,
    /// Index within the category
    pub index: usize,
}

/// Settlement state after a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SettlementStatus {
    /// No box is mid-settlement
    #[default]
    Idle,
    /// A box was left partially paid out
    Settling(SettlementCursor),
}

impl SettlementStatus {
    /// Status for an optional cursor
    pub fn from_cursor(cursor: Option<SettlementCursor>) -> Self {
        cursor.map_or(SettlementStatus::Idle, SettlementStatus::Settling)
    }

    /// True while a box is mid-settlement
    pub fn is_settling(&self) -> bool {
        matches!(self, SettlementStatus::Settling(_))
    }
}

/// Everything one entry point did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Events in the order they happened
    pub events: Vec<ExchangeEvent>,
    /// Set by order submissions
    pub placed: Option<PlacedOrder>,
    /// Set by liquidity operations
    pub liquidity: Option<LiquidityChange>,
    /// Settlement state when the call returned
    pub settlement: SettlementStatus,
    /// Orders paid out during the call
    pub orders_paid: usize,
}

impl CallOutcome {
    /// Settlement summaries `(box, price, rates)` emitted during the call
    pub fn settlement_summaries(&self) -> Vec<(BoxId, Price, RefundRates)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExchangeEvent::SettlementStarted {
                    box_id,
                    price,
                    refund_rates,
                } => Some((*box_id, *price, *refund_rates)),
                _ => None,
            })
            .collect()
    }

    /// Last reserve update emitted during the call
    pub fn reserves_update(&self) -> Option<Reserves> {
        self.events.iter().rev().find_map(ExchangeEvent::reserves)
    }

    /// Boxes fully paid out during the call
    pub fn settled_boxes(&self) -> Vec<BoxId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExchangeEvent::BoxSettled { box_id } => Some(*box_id),
                _ => None,
            })
            .collect()
    }
}
