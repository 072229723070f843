//! Exchange state.
//!
//! Everything one exchange owns: the pool, the queue of open and settling
//! boxes, the settlement cursor, accrued fees and escrowed payouts. Entry
//! points mutate a draft clone and swap it in only on success.

use std::collections::{BTreeMap, VecDeque};

use boxswap_domain::{
    AccountId, AssetKind, BoxId, Direction, EscrowBalance, LienAccrual, Order, OrderBox,
    SettlementCursor, WindowId,
};
use boxswap_engine::LiquidityPool;
use serde::{Deserialize, Serialize};

use crate::error::{ExecError, ExecResult};
use crate::outcome::PlacedOrder;

/// Complete state of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeState {
    pub(crate) pool: LiquidityPool,
    /// Unsettled boxes, oldest first. Only the front box may be settling.
    pub(crate) boxes: VecDeque<OrderBox>,
    pub(crate) next_box_id: BoxId,
    pub(crate) cursor: Option<SettlementCursor>,
    pub(crate) lien: LienAccrual,
    pub(crate) escrow: BTreeMap<AccountId, EscrowBalance>,
}

impl Default for ExchangeState {
    fn default() -> Self {
        Self {
            pool: LiquidityPool::new(),
            boxes: VecDeque::new(),
            next_box_id: BoxId::FIRST,
            cursor: None,
            lien: LienAccrual::default(),
            escrow: BTreeMap::new(),
        }
    }
}

impl ExchangeState {
    /// Fresh, uninitialized state
    pub fn new() -> Self {
        Self::default()
    }

    /// Liquidity pool
    pub fn pool(&self) -> &LiquidityPool {
        &self.pool
    }

    /// Unsettled boxes, oldest first
    pub fn boxes(&self) -> impl Iterator<Item = &OrderBox> {
        self.boxes.iter()
    }

    /// Look up an unsettled box
    pub fn find_box(&self, box_id: BoxId) -> Option<&OrderBox> {
        self.boxes.iter().find(|b| b.id == box_id)
    }

    /// Settlement cursor, if a box is mid-settlement
    pub fn cursor(&self) -> Option<SettlementCursor> {
        self.cursor
    }

    /// Protocol fees accrued and not yet swept
    pub fn lien(&self) -> LienAccrual {
        self.lien
    }

    /// Escrowed payouts of one account
    pub fn escrow_of(&self, account: &AccountId) -> EscrowBalance {
        self.escrow.get(account).copied().unwrap_or_default()
    }

    /// Hold a failed payout for its beneficiary
    pub(crate) fn credit_escrow(&mut self, account: &AccountId, asset: AssetKind, amount: u128) {
        self.escrow
            .entry(account.clone())
            .or_default()
            .credit(asset, amount);
    }

    /// Zero one asset of an account's escrow, returning what was held
    pub(crate) fn take_escrow(&mut self, account: &AccountId, asset: AssetKind) -> u128 {
        let Some(balance) = self.escrow.get_mut(account) else {
            return 0;
        };
        let held = match asset {
            AssetKind::Base => std::mem::take(&mut balance.base),
            AssetKind::Settlement => std::mem::take(&mut balance.settlement),
        };
        if balance.is_empty() {
            self.escrow.remove(account);
        }
        held
    }

    /// Zero one asset of the lien, returning what was owed
    pub(crate) fn take_lien(&mut self, asset: AssetKind) -> u128 {
        match asset {
            AssetKind::Base => std::mem::take(&mut self.lien.base_owed),
            AssetKind::Settlement => std::mem::take(&mut self.lien.settlement_owed),
        }
    }

    /// True when the oldest box is sealed and waiting for payouts
    pub fn has_pending_settlement(&self, current: WindowId) -> bool {
        self.boxes
            .front()
            .is_some_and(|front| front.is_sealed(current))
    }

    /// Add an order to the box of the current window, opening it if needed.
    ///
    /// Callers settle sealed boxes first, so the current window's box is
    /// never the one being paid out.
    pub(crate) fn submit(
        &mut self,
        orderer: &AccountId,
        amount_in: u128,
        direction: Direction,
        is_limit: bool,
        current: WindowId,
    ) -> ExecResult<PlacedOrder> {
        let reuse_back = match self.boxes.back() {
            Some(back) if back.window == current => true,
            Some(back) if back.window > current => {
                return Err(ExecError::InvalidState(format!(
                    "window moved backwards: box {} is at {}, clock at {}",
                    back.id, back.window, current
                )));
            },
            _ => false,
        };

        if !reuse_back {
            let id = self.next_box_id;
            self.boxes.push_back(OrderBox::new(id, current));
            self.next_box_id = id.next();
        }

        let target = self
            .boxes
            .back_mut()
            .ok_or_else(|| ExecError::InvalidState("no open box".to_string()))?;
        if target.plan().is_some() {
            return Err(ExecError::InvalidState(format!(
                "box {} is already settling",
                target.id
            )));
        }

        let order = Order::new(orderer.clone(), amount_in, is_limit, direction, target.id)?;
        let category = order.category();
        let index = target.push(order)?;

        Ok(PlacedOrder {
            box_id: target.id,
            window: target.window,
            category,
            index,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::OrderCategory;

    fn alice() -> AccountId {
        AccountId::new("alice").unwrap()
    }

    #[test]
    fn test_submit_groups_orders_by_window() {
        let mut state = ExchangeState::new();
        let w = WindowId::new(4);

        let first = state
            .submit(&alice(), 100, Direction::BaseToSettlement, false, w)
            .unwrap();
        let second = state
            .submit(&alice(), 50, Direction::SettlementToBase, true, w)
            .unwrap();
        let third = state
            .submit(&alice(), 70, Direction::BaseToSettlement, false, w)
            .unwrap();

        assert_eq!(first.box_id, BoxId::FIRST);
        assert_eq!(second.category, OrderCategory::SellLimit);
        assert_eq!(third.index, 1);
        assert_eq!(state.boxes().count(), 1);

        let next = state
            .submit(&alice(), 10, Direction::BaseToSettlement, false, WindowId::new(6))
            .unwrap();
        assert_eq!(next.box_id, BoxId::new(2));
        assert_eq!(next.window, WindowId::new(6));
        assert_eq!(state.boxes().count(), 2);
    }

    #[test]
    fn test_submit_rejects_backwards_clock() {
        let mut state = ExchangeState::new();
        state
            .submit(&alice(), 100, Direction::BaseToSettlement, false, WindowId::new(9))
            .unwrap();

        let result = state.submit(&alice(), 1, Direction::BaseToSettlement, false, WindowId::new(8));
        assert!(matches!(result, Err(ExecError::InvalidState(_))));
    }

    #[test]
    fn test_submit_rejects_zero_amount() {
        let mut state = ExchangeState::new();
        let result = state.submit(&alice(), 0, Direction::BaseToSettlement, false, WindowId::new(1));
        assert!(matches!(result, Err(ExecError::InvalidAmount(_))));
    }

    #[test]
    fn test_escrow_take_clears_entry() {
        let mut state = ExchangeState::new();
        state.credit_escrow(&alice(), AssetKind::Base, 7);
        state.credit_escrow(&alice(), AssetKind::Settlement, 3);

        assert_eq!(state.take_escrow(&alice(), AssetKind::Base), 7);
        assert_eq!(state.escrow_of(&alice()).settlement, 3);
        assert_eq!(state.take_escrow(&alice(), AssetKind::Settlement), 3);
        assert!(state.escrow.is_empty());
        assert_eq!(state.take_escrow(&alice(), AssetKind::Base), 0);
    }

    #[test]
    fn test_state_snapshot_round_trips_through_json() {
        let mut state = ExchangeState::new();
        state
            .submit(&alice(), 100, Direction::BaseToSettlement, false, WindowId::new(2))
            .unwrap();
        state.credit_escrow(&alice(), AssetKind::Base, 1);

        let json = serde_json::to_string(&state).unwrap();
        let restored: ExchangeState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
