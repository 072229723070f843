//! Execution scheduler: budgeted, resumable box settlement.
//!
//! A sealed box is settled in two phases. When it starts, the engine plans
//! price, refund rates and the reserve update, and the pool moves at once.
//! Payouts are then made order by order in category order
//! (buy non-limit, buy limit, sell non-limit, sell limit) until the per-call
//! budget runs out. The cursor records where the next call resumes.
//!
//! The scheduler never touches assets. It returns the transfers to make and
//! the caller executes them after committing the state.
//!
//! A box whose plan faults would block every box behind it. Such a box is
//! settled as a no-trade box instead: every order is refunded in full, the
//! pool is untouched and a `SettlementFaulted` event carries the fault.

use boxswap_domain::{
    AccountId, AssetKind, ExchangeEvent, SettlementCursor, SettlementPlan, WindowId,
};
use boxswap_engine::{EngineError, SettlementEngine};
use tracing::{debug, info, warn};

use crate::error::{ExecError, ExecResult};
use crate::state::ExchangeState;

/// Orders paid out per call unless configured otherwise.
pub const DEFAULT_SETTLE_BUDGET: usize = 10;

// =============================================================================
// Progress
// =============================================================================

/// A payout owed by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Beneficiary
    pub to: AccountId,
    /// Asset to send
    pub asset: AssetKind,
    /// Amount to send
    pub amount: u128,
}

/// What one `advance` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementProgress {
    /// Payouts to execute, in order
    pub transfers: Vec<Transfer>,
    /// Settlement events, in order
    pub events: Vec<ExchangeEvent>,
    /// Orders paid out
    pub orders_paid: usize,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Drives settlement of sealed boxes, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionScheduler {
    engine: SettlementEngine,
    budget: usize,
}

impl Default for ExecutionScheduler {
    fn default() -> Self {
        Self {
            engine: SettlementEngine::default(),
            budget: DEFAULT_SETTLE_BUDGET,
        }
    }
}

impl ExecutionScheduler {
    /// Create a scheduler paying out at most `budget` orders per call
    pub fn new(engine: SettlementEngine, budget: usize) -> ExecResult<Self> {
        if budget == 0 {
            return Err(ExecError::Config("settlement budget must be at least 1".to_string()));
        }
        Ok(Self { engine, budget })
    }

    /// Orders paid out per call
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Settlement engine in use
    pub fn engine(&self) -> &SettlementEngine {
        &self.engine
    }

    /// Settle sealed boxes until none is left or the budget is spent.
    ///
    /// Faults leave `state` partially updated; callers run this on a draft.
    pub fn advance(
        &self,
        state: &mut ExchangeState,
        current: WindowId,
    ) -> ExecResult<SettlementProgress> {
        let mut progress = SettlementProgress::default();

        while progress.orders_paid < self.budget {
            let reserves = state.pool.reserves();
            let Some(front) = state.boxes.front_mut() else {
                break;
            };
            if !front.is_sealed(current) {
                break;
            }
            let box_id = front.id;

            let plan = match front.plan() {
                Some(plan) => *plan,
                None => {
                    let plan = match self.engine.plan(reserves, &front.aggregates()) {
                        Ok(plan) => plan,
                        Err(EngineError::ArithmeticFault(reason)) => {
                            warn!(%box_id, %reason, "Box cannot be planned, refunding every order");
                            progress
                                .events
                                .push(ExchangeEvent::SettlementFaulted { box_id, reason });
                            SettlementPlan::no_trade(reserves)
                        },
                        Err(err) => return Err(err.into()),
                    };
                    front.begin_settlement(plan)?;
                    if !plan.price.is_zero() {
                        state.pool.apply_settlement(plan.reserves_after)?;
                        state.lien.accrue(plan.lien)?;
                    }
                    state.cursor = Some(SettlementCursor::start(box_id));

                    info!(
                        %box_id,
                        price = %plan.price,
                        orders = front.order_count(),
                        base_reserve = plan.reserves_after.base,
                        settlement_reserve = plan.reserves_after.settlement,
                        "Box settlement started"
                    );
                    progress.events.push(ExchangeEvent::SettlementStarted {
                        box_id,
                        price: plan.price,
                        refund_rates: plan.refund_rates,
                    });
                    progress.events.push(ExchangeEvent::ReservesUpdated {
                        base_reserve: plan.reserves_after.base,
                        settlement_reserve: plan.reserves_after.settlement,
                    });
                    plan
                },
            };

            let mut cursor = state
                .cursor
                .filter(|c| c.box_id == box_id)
                .unwrap_or_else(|| SettlementCursor::start(box_id));

            while progress.orders_paid < self.budget {
                let Some(order) = front.order(cursor.category, cursor.index) else {
                    match cursor.category.next() {
                        Some(next) => {
                            cursor.category = next;
                            cursor.index = 0;
                            continue;
                        },
                        None => break,
                    }
                };

                let payout = self.engine.payout(order, &plan)?;
                let (proceeds_asset, proceeds) = payout.proceeds;
                let (refund_asset, refund) = payout.refund;
                for (asset, amount) in [(proceeds_asset, proceeds), (refund_asset, refund)] {
                    if amount > 0 {
                        progress.transfers.push(Transfer {
                            to: order.orderer.clone(),
                            asset,
                            amount,
                        });
                    }
                }

                debug!(
                    %box_id,
                    category = %cursor.category,
                    index = cursor.index,
                    orderer = %order.orderer,
                    proceeds,
                    refund,
                    "Order settled"
                );
                progress.events.push(ExchangeEvent::OrderSettled {
                    box_id,
                    category: cursor.category,
                    index: cursor.index,
                    orderer: order.orderer.clone(),
                    proceeds,
                    refund,
                });

                cursor.index += 1;
                progress.orders_paid += 1;
            }

            // Skip exhausted categories so the cursor points at a real order
            let finished = loop {
                if front.order(cursor.category, cursor.index).is_some() {
                    break false;
                }
                match cursor.category.next() {
                    Some(next) => {
                        cursor.category = next;
                        cursor.index = 0;
                    },
                    None => break true,
                }
            };

            if !finished {
                state.cursor = Some(cursor);
                break;
            }

            front.mark_settled()?;
            state.boxes.pop_front();
            state.cursor = None;
            info!(%box_id, "Box settled");
            progress.events.push(ExchangeEvent::BoxSettled { box_id });
        }

        Ok(progress)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::{BoxId, Direction, OrderCategory, Reserves};
    use boxswap_engine::SettlementParams;

    fn settled_ids(progress: &SettlementProgress) -> Vec<BoxId> {
        progress
            .events
            .iter()
            .filter_map(|e| match e {
                ExchangeEvent::BoxSettled { box_id } => Some(*box_id),
                _ => None,
            })
            .collect()
    }

    fn account(name: &str) -> AccountId {
        AccountId::new(name).unwrap()
    }

    fn scheduler(budget: usize) -> ExecutionScheduler {
        let engine = SettlementEngine::new(SettlementParams::default()).unwrap();
        ExecutionScheduler::new(engine, budget).unwrap()
    }

    /// Pool (2_400_000, 1_600_000) with 4+4 buys of 1000, 4 non-limit sells
    /// of 160 and 4 limit sells of 1600, all in window 1.
    fn sixteen_order_state() -> ExchangeState {
        let mut state = ExchangeState::new();
        state
            .pool
            .initialize(&account("lp"), 1_600_000, 2_400_000)
            .unwrap();

        let w = WindowId::new(1);
        for i in 0..4 {
            let who = account(&format!("trader{}", i));
            state.submit(&who, 1000, Direction::BaseToSettlement, false, w).unwrap();
            state.submit(&who, 1000, Direction::BaseToSettlement, true, w).unwrap();
            state.submit(&who, 160, Direction::SettlementToBase, false, w).unwrap();
            state.submit(&who, 1600, Direction::SettlementToBase, true, w).unwrap();
        }
        state
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = ExecutionScheduler::new(SettlementEngine::default(), 0);
        assert!(matches!(result, Err(ExecError::Config(_))));
        assert_eq!(ExecutionScheduler::default().budget(), DEFAULT_SETTLE_BUDGET);
    }

    #[test]
    fn test_open_box_is_not_settled() {
        let mut state = sixteen_order_state();
        let progress = scheduler(10).advance(&mut state, WindowId::new(1)).unwrap();

        assert_eq!(progress, SettlementProgress::default());
        assert_eq!(state.pool.reserves(), Reserves::new(2_400_000, 1_600_000));
    }

    #[test]
    fn test_budget_ten_resumes_in_sell_non_limit() {
        let mut state = sixteen_order_state();
        let sched = scheduler(10);

        let first = sched.advance(&mut state, WindowId::new(2)).unwrap();
        assert_eq!(first.orders_paid, 10);
        assert_eq!(state.pool.reserves(), Reserves::new(2_397_621, 1_601_616));
        assert_eq!(
            state.cursor(),
            Some(SettlementCursor {
                box_id: BoxId::FIRST,
                category: OrderCategory::SellNonLimit,
                index: 2,
            })
        );
        assert!(settled_ids(&first).is_empty());

        let second = sched.advance(&mut state, WindowId::new(2)).unwrap();
        assert_eq!(second.orders_paid, 6);
        assert_eq!(settled_ids(&second), vec![BoxId::FIRST]);
        assert_eq!(state.cursor(), None);
        assert_eq!(state.boxes().count(), 0);
        // planned once: reserves did not move again
        assert_eq!(state.pool.reserves(), Reserves::new(2_397_621, 1_601_616));
    }

    #[test]
    fn test_budget_twelve_resumes_at_sell_limit_start() {
        let mut state = sixteen_order_state();
        let first = scheduler(12).advance(&mut state, WindowId::new(2)).unwrap();

        assert_eq!(first.orders_paid, 12);
        assert_eq!(
            state.cursor(),
            Some(SettlementCursor {
                box_id: BoxId::FIRST,
                category: OrderCategory::SellLimit,
                index: 0,
            })
        );
    }

    #[test]
    fn test_settlement_events_in_order() {
        let mut state = sixteen_order_state();
        let progress = scheduler(16).advance(&mut state, WindowId::new(2)).unwrap();

        assert_eq!(progress.orders_paid, 16);
        assert_eq!(progress.events.len(), 2 + 16 + 1);
        assert_eq!(progress.events[0].event_type(), "settlement_started");
        assert_eq!(progress.events[1].event_type(), "reserves_updated");
        assert_eq!(progress.events[18].event_type(), "box_settled");

        // limit sells are partially refunded
        let partial = progress
            .events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ExchangeEvent::OrderSettled {
                        category: OrderCategory::SellLimit,
                        proceeds,
                        refund,
                        ..
                    } if *proceeds > 0 && *refund > 0
                )
            })
            .count();
        assert_eq!(partial, 4);
        assert_eq!(progress.transfers.len(), 16 + 4);
    }

    #[test]
    fn test_lien_accrues_on_start() {
        let mut state = ExchangeState::new();
        state
            .pool
            .initialize(&account("lp"), 2_000_000, 3_000_000)
            .unwrap();
        let w = WindowId::new(3);
        let trader = account("trader");
        state.submit(&trader, 50_000, Direction::BaseToSettlement, false, w).unwrap();
        state.submit(&trader, 50_000, Direction::BaseToSettlement, false, w).unwrap();
        state.submit(&trader, 20_000, Direction::SettlementToBase, false, w).unwrap();
        state.submit(&trader, 20_000, Direction::SettlementToBase, false, w).unwrap();

        scheduler(10).advance(&mut state, WindowId::new(4)).unwrap();

        assert_eq!(state.lien().base_owed, 59);
        assert_eq!(state.lien().settlement_owed, 23);
    }

    #[test]
    fn test_faulting_box_is_refunded_and_dropped() {
        let mut state = ExchangeState::new();
        // reference price T·D/E does not fit in u128
        state
            .pool
            .initialize(&account("lp"), 1_000_000_000_000_000_000_000, 1)
            .unwrap();
        let reserves = state.pool.reserves();
        let (alice, bob) = (account("alice"), account("bob"));
        state
            .submit(&alice, 400, Direction::BaseToSettlement, true, WindowId::new(1))
            .unwrap();
        state
            .submit(&bob, 150, Direction::SettlementToBase, false, WindowId::new(1))
            .unwrap();
        state
            .submit(&bob, 70, Direction::SettlementToBase, false, WindowId::new(2))
            .unwrap();

        let sched = scheduler(10);
        let progress = sched.advance(&mut state, WindowId::new(2)).unwrap();

        assert!(matches!(
            &progress.events[0],
            ExchangeEvent::SettlementFaulted { box_id, .. } if *box_id == BoxId::FIRST
        ));
        assert_eq!(progress.orders_paid, 2);
        assert_eq!(
            progress.transfers,
            vec![
                Transfer { to: alice, asset: AssetKind::Base, amount: 400 },
                Transfer { to: bob.clone(), asset: AssetKind::Settlement, amount: 150 },
            ]
        );
        assert_eq!(settled_ids(&progress), vec![BoxId::FIRST]);
        assert_eq!(state.pool.reserves(), reserves);
        assert!(state.lien().is_empty());

        // the box behind it is no longer blocked
        let progress = sched.advance(&mut state, WindowId::new(3)).unwrap();
        assert_eq!(settled_ids(&progress), vec![BoxId::new(2)]);
        assert_eq!(
            progress.transfers,
            vec![Transfer { to: bob, asset: AssetKind::Settlement, amount: 70 }]
        );
        assert_eq!(state.boxes().count(), 0);
    }

    #[test]
    fn test_boxes_settle_oldest_first_within_budget() {
        let mut state = sixteen_order_state();
        let trader = account("late");
        state
            .submit(&trader, 500, Direction::BaseToSettlement, false, WindowId::new(2))
            .unwrap();

        let sched = scheduler(10);
        sched.advance(&mut state, WindowId::new(3)).unwrap();
        // second box waits behind the first
        assert_eq!(state.boxes().count(), 2);

        let progress = sched.advance(&mut state, WindowId::new(3)).unwrap();
        assert_eq!(progress.orders_paid, 7);
        assert_eq!(settled_ids(&progress), vec![BoxId::FIRST, BoxId::new(2)]);
        assert_eq!(state.boxes().count(), 0);
    }
}
