//! BoxExchange: the exchange entry points.
//!
//! Every entry point follows the same shape:
//!
//! ```text
//! guard → draft = state.clone() → settle sealed boxes → operation
//!       → pull funds → commit draft → pay out (escrow on failure)
//! ```
//!
//! The guard is taken with `try_lock`, so a call arriving while another is
//! in flight (for example from inside an asset callback) fails with
//! `ReentrantCall` instead of waiting.

use std::sync::Arc;

use boxswap_domain::{
    AccountId, AssetId, AssetKind, BoxAggregates, BoxId, Direction, EscrowBalance,
    ExchangeEvent, LienAccrual, Order, OrderCategory, Price, RefundRates, Reserves,
    SettlementCursor, WindowId,
};
use boxswap_engine::{LiquidityChange, SettlementEngine, SettlementParams};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::{ExecError, ExecResult};
use crate::outcome::{CallOutcome, SettlementStatus};
use crate::ports::{AssetPort, WindowClock};
use crate::scheduler::{ExecutionScheduler, SettlementProgress, Transfer, DEFAULT_SETTLE_BUDGET};
use crate::state::ExchangeState;

// =============================================================================
// Configuration
// =============================================================================

/// Construction parameters of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Asset traded against the base asset
    pub asset: AssetId,
    /// Account holding the exchange's funds
    pub exchange_account: AccountId,
    /// Receiver of swept protocol fees
    pub fee_sink: AccountId,
    /// Settlement math parameters
    pub params: SettlementParams,
    /// Orders paid out per call
    pub budget: usize,
}

impl ExchangeConfig {
    /// Config with default parameters and budget
    pub fn new(asset: AssetId, exchange_account: AccountId, fee_sink: AccountId) -> Self {
        Self {
            asset,
            exchange_account,
            fee_sink,
            params: SettlementParams::default(),
            budget: DEFAULT_SETTLE_BUDGET,
        }
    }
}

/// Read-only view of an unsettled box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSummary {
    /// Box identifier
    pub box_id: BoxId,
    /// Window the box accumulated
    pub window: WindowId,
    /// Category totals
    pub aggregates: BoxAggregates,
    /// Number of orders
    pub order_count: usize,
    /// Clearing price, once settlement started
    pub price: Option<Price>,
    /// Refund rates, once settlement started
    pub refund_rates: Option<RefundRates>,
}

// =============================================================================
// Exchange
// =============================================================================

/// A batched constant-product exchange between a base asset and one
/// settlement asset.
pub struct BoxExchange {
    config: ExchangeConfig,
    base: Arc<dyn AssetPort>,
    settlement: Arc<dyn AssetPort>,
    clock: Arc<dyn WindowClock>,
    scheduler: ExecutionScheduler,
    state: Mutex<ExchangeState>,
}

impl BoxExchange {
    /// Create an empty exchange
    pub fn new(
        config: ExchangeConfig,
        base: Arc<dyn AssetPort>,
        settlement: Arc<dyn AssetPort>,
        clock: Arc<dyn WindowClock>,
    ) -> ExecResult<Self> {
        Self::restore(config, base, settlement, clock, ExchangeState::new())
    }

    /// Rebuild an exchange from a saved state
    pub fn restore(
        config: ExchangeConfig,
        base: Arc<dyn AssetPort>,
        settlement: Arc<dyn AssetPort>,
        clock: Arc<dyn WindowClock>,
        state: ExchangeState,
    ) -> ExecResult<Self> {
        let engine = SettlementEngine::new(config.params)?;
        let scheduler = ExecutionScheduler::new(engine, config.budget)?;
        Ok(Self {
            config,
            base,
            settlement,
            clock,
            scheduler,
            state: Mutex::new(state),
        })
    }

    /// Construction parameters
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Asset this exchange trades
    pub fn asset(&self) -> &AssetId {
        &self.config.asset
    }

    /// Window according to the exchange's clock
    pub fn current_window(&self) -> WindowId {
        self.clock.current_window()
    }

    // =========================================================================
    // Liquidity
    // =========================================================================

    /// First deposit. Fixes the price ratio and mints the initial shares.
    pub async fn initialize_exchange(
        &self,
        caller: &AccountId,
        settlement_amount: u128,
        base_amount: u128,
    ) -> ExecResult<CallOutcome> {
        let mut guard = self.guard()?;
        let mut draft = guard.clone();

        let change = draft.pool.initialize(caller, settlement_amount, base_amount)?;
        self.scheduler.engine().check_pool(draft.pool.reserves())?;
        self.pull_pair(&mut guard, caller, change.base, change.settlement).await?;
        *guard = draft;

        info!(
            asset = %self.config.asset,
            provider = %caller,
            base = change.base,
            settlement = change.settlement,
            "Exchange initialized"
        );

        let mut outcome = CallOutcome {
            liquidity: Some(change),
            ..Default::default()
        };
        outcome.events.push(ExchangeEvent::ExchangeInitialized {
            provider: caller.clone(),
            base_amount: change.base,
            settlement_amount: change.settlement,
            shares: change.shares,
        });
        outcome.events.push(reserves_event(guard.pool.reserves()));
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    /// Deposit `base_amount` plus the proportional settlement amount
    /// (rounded up) for newly minted shares.
    pub async fn add_liquidity(
        &self,
        caller: &AccountId,
        deadline: WindowId,
        min_shares: u128,
        base_amount: u128,
    ) -> ExecResult<CallOutcome> {
        let mut guard = self.guard()?;
        let current = self.check_deadline(deadline)?;
        let mut draft = guard.clone();

        let progress = self.scheduler.advance(&mut draft, current)?;
        let change = draft.pool.add_liquidity(caller, min_shares, base_amount)?;
        self.scheduler.engine().check_pool(draft.pool.reserves())?;
        self.pull_pair(&mut guard, caller, change.base, change.settlement).await?;
        *guard = draft;

        info!(
            asset = %self.config.asset,
            provider = %caller,
            base = change.base,
            settlement = change.settlement,
            shares = change.shares,
            "Liquidity added"
        );

        let mut outcome = self.start_outcome(progress.events, progress.orders_paid);
        outcome.liquidity = Some(change);
        outcome.events.push(ExchangeEvent::LiquidityAdded {
            provider: caller.clone(),
            base_amount: change.base,
            settlement_amount: change.settlement,
            shares: change.shares,
        });
        outcome.events.push(reserves_event(guard.pool.reserves()));

        self.pay_out(&mut guard, progress.transfers, &mut outcome).await;
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    /// Burn `shares` for a proportional share of both reserves.
    pub async fn remove_liquidity(
        &self,
        caller: &AccountId,
        deadline: WindowId,
        min_base: u128,
        min_settlement: u128,
        shares: u128,
    ) -> ExecResult<CallOutcome> {
        let mut guard = self.guard()?;
        let current = self.check_deadline(deadline)?;
        let mut draft = guard.clone();

        let mut progress = self.scheduler.advance(&mut draft, current)?;
        let change = draft
            .pool
            .remove_liquidity(caller, min_base, min_settlement, shares)?;
        *guard = draft;

        info!(
            asset = %self.config.asset,
            provider = %caller,
            base = change.base,
            settlement = change.settlement,
            shares = change.shares,
            "Liquidity removed"
        );

        let mut outcome = self.start_outcome(progress.events, progress.orders_paid);
        outcome.liquidity = Some(change);
        outcome.events.push(ExchangeEvent::LiquidityRemoved {
            provider: caller.clone(),
            base_amount: change.base,
            settlement_amount: change.settlement,
            shares: change.shares,
        });
        outcome.events.push(reserves_event(guard.pool.reserves()));

        progress.transfers.extend(withdrawal_transfers(caller, &change));
        self.pay_out(&mut guard, progress.transfers, &mut outcome).await;
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Sell base asset for the settlement asset in the current window's box.
    pub async fn order_base_to_settlement(
        &self,
        caller: &AccountId,
        deadline: WindowId,
        amount: u128,
        is_limit: bool,
    ) -> ExecResult<CallOutcome> {
        self.place_order(caller, deadline, amount, is_limit, Direction::BaseToSettlement)
            .await
    }

    /// Sell the settlement asset for base asset in the current window's box.
    pub async fn order_settlement_to_base(
        &self,
        caller: &AccountId,
        deadline: WindowId,
        amount: u128,
        is_limit: bool,
    ) -> ExecResult<CallOutcome> {
        self.place_order(caller, deadline, amount, is_limit, Direction::SettlementToBase)
            .await
    }

    async fn place_order(
        &self,
        caller: &AccountId,
        deadline: WindowId,
        amount: u128,
        is_limit: bool,
        direction: Direction,
    ) -> ExecResult<CallOutcome> {
        if amount == 0 {
            return Err(ExecError::InvalidAmount("order amount must be positive".to_string()));
        }
        let mut guard = self.guard()?;
        let current = self.check_deadline(deadline)?;
        if !guard.pool.is_initialized() {
            return Err(ExecError::NotInitialized);
        }
        let mut draft = guard.clone();

        let progress = self.scheduler.advance(&mut draft, current)?;
        let placed = draft.submit(caller, amount, direction, is_limit, current)?;
        let exchange = &self.config.exchange_account;
        self.port(direction.asset_in())
            .transfer_from(exchange, caller, exchange, amount)
            .await?;
        *guard = draft;

        info!(
            asset = %self.config.asset,
            orderer = %caller,
            box_id = %placed.box_id,
            category = %placed.category,
            amount,
            "Order placed"
        );

        let mut outcome = self.start_outcome(progress.events, progress.orders_paid);
        outcome.placed = Some(placed);
        outcome.events.push(ExchangeEvent::OrderPlaced {
            box_id: placed.box_id,
            window: placed.window,
            orderer: caller.clone(),
            category: placed.category,
            amount_in: amount,
        });

        self.pay_out(&mut guard, progress.transfers, &mut outcome).await;
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    // =========================================================================
    // Settlement and fees
    // =========================================================================

    /// Pay out sealed boxes up to the per-call budget.
    ///
    /// Anyone may call this. With nothing sealed it does nothing.
    pub async fn settle_pending_boxes(&self) -> ExecResult<CallOutcome> {
        let mut guard = self.guard()?;
        let current = self.clock.current_window();
        let mut draft = guard.clone();

        let progress: SettlementProgress = self.scheduler.advance(&mut draft, current)?;
        *guard = draft;

        let mut outcome = self.start_outcome(progress.events, progress.orders_paid);
        self.pay_out(&mut guard, progress.transfers, &mut outcome).await;
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    /// Send accrued protocol fees to the fee sink.
    ///
    /// Each asset is zeroed only after its transfer succeeds.
    pub async fn sweep_fees_to_sink(&self) -> ExecResult<CallOutcome> {
        let mut guard = self.guard()?;
        let sink = self.config.fee_sink.clone();
        let lien = guard.lien;

        let mut paid = LienAccrual::default();
        let mut failure = None;
        for (kind, owed) in [
            (AssetKind::Base, lien.base_owed),
            (AssetKind::Settlement, lien.settlement_owed),
        ] {
            if owed == 0 {
                continue;
            }
            match self
                .port(kind)
                .transfer(&self.config.exchange_account, &sink, owed)
                .await
            {
                Ok(()) => {
                    let taken = guard.take_lien(kind);
                    match kind {
                        AssetKind::Base => paid.base_owed = taken,
                        AssetKind::Settlement => paid.settlement_owed = taken,
                    }
                },
                Err(err) => {
                    error!(
                        asset = %self.config.asset,
                        %kind,
                        owed,
                        error = %err,
                        "Fee sweep transfer failed"
                    );
                    failure = Some(err);
                },
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let mut outcome = CallOutcome::default();
        if !paid.is_empty() {
            info!(
                asset = %self.config.asset,
                %sink,
                base = paid.base_owed,
                settlement = paid.settlement_owed,
                "Fees swept"
            );
            outcome.events.push(ExchangeEvent::FeesSwept {
                sink,
                base_amount: paid.base_owed,
                settlement_amount: paid.settlement_owed,
            });
        }
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    /// Pay the caller everything escrowed for them.
    pub async fn claim_escrow(&self, caller: &AccountId) -> ExecResult<CallOutcome> {
        let mut guard = self.guard()?;
        let held = guard.escrow_of(caller);

        let mut paid = EscrowBalance::default();
        let mut failure = None;
        for kind in [AssetKind::Base, AssetKind::Settlement] {
            let amount = held.get(kind);
            if amount == 0 {
                continue;
            }
            match self
                .port(kind)
                .transfer(&self.config.exchange_account, caller, amount)
                .await
            {
                Ok(()) => {
                    let taken = guard.take_escrow(caller, kind);
                    paid.credit(kind, taken);
                },
                Err(err) => {
                    warn!(
                        account = %caller,
                        %kind,
                        amount,
                        error = %err,
                        "Escrow claim transfer failed"
                    );
                    failure = Some(err);
                },
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let mut outcome = CallOutcome::default();
        if !paid.is_empty() {
            info!(account = %caller, base = paid.base, settlement = paid.settlement, "Escrow claimed");
            outcome.events.push(ExchangeEvent::EscrowClaimed {
                account: caller.clone(),
                base_amount: paid.base,
                settlement_amount: paid.settlement,
            });
        }
        outcome.settlement = SettlementStatus::from_cursor(guard.cursor);
        Ok(outcome)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Protocol fees accrued and not yet swept
    pub fn accrued_fees(&self) -> ExecResult<LienAccrual> {
        Ok(self.guard()?.lien)
    }

    /// Current pool reserves
    pub fn pool_amounts(&self) -> ExecResult<Reserves> {
        Ok(self.guard()?.pool.reserves())
    }

    /// Total shares outstanding
    pub fn total_shares(&self) -> ExecResult<u128> {
        Ok(self.guard()?.pool.total_shares())
    }

    /// Shares held by one provider
    pub fn shares_of(&self, account: &AccountId) -> ExecResult<u128> {
        Ok(self.guard()?.pool.shares_of(account))
    }

    /// Summary of an unsettled box. Fully settled boxes are forgotten.
    pub fn box_summary(&self, box_id: BoxId) -> ExecResult<Option<BoxSummary>> {
        let state = self.guard()?;
        Ok(state.find_box(box_id).map(|b| BoxSummary {
            box_id: b.id,
            window: b.window,
            aggregates: b.aggregates(),
            order_count: b.order_count(),
            price: b.plan().map(|p| p.price),
            refund_rates: b.plan().map(|p| p.refund_rates),
        }))
    }

    /// One order of an unsettled box
    pub fn order_data(
        &self,
        box_id: BoxId,
        category: OrderCategory,
        index: usize,
    ) -> ExecResult<Option<Order>> {
        let state = self.guard()?;
        Ok(state
            .find_box(box_id)
            .and_then(|b| b.order(category, index))
            .cloned())
    }

    /// Escrowed payouts of one account
    pub fn escrow_of(&self, account: &AccountId) -> ExecResult<EscrowBalance> {
        Ok(self.guard()?.escrow_of(account))
    }

    /// Settlement cursor, if a box is mid-settlement
    pub fn cursor(&self) -> ExecResult<Option<SettlementCursor>> {
        Ok(self.guard()?.cursor)
    }

    /// Ids of boxes not yet fully paid out, oldest first
    pub fn unsettled_boxes(&self) -> ExecResult<Vec<BoxId>> {
        Ok(self.guard()?.boxes().map(|b| b.id).collect())
    }

    /// Copy of the full state, for persistence
    pub fn snapshot(&self) -> ExecResult<ExchangeState> {
        Ok(self.guard()?.clone())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Views take the same guard, so they also fail inside a running call.
    fn guard(&self) -> ExecResult<MutexGuard<'_, ExchangeState>> {
        self.state.try_lock().map_err(|_| ExecError::ReentrantCall)
    }

    fn port(&self, kind: AssetKind) -> &dyn AssetPort {
        match kind {
            AssetKind::Base => self.base.as_ref(),
            AssetKind::Settlement => self.settlement.as_ref(),
        }
    }

    fn check_deadline(&self, deadline: WindowId) -> ExecResult<WindowId> {
        let current = self.clock.current_window();
        if current > deadline {
            return Err(ExecError::Expired { deadline, current });
        }
        Ok(current)
    }

    fn start_outcome(&self, events: Vec<ExchangeEvent>, orders_paid: usize) -> CallOutcome {
        CallOutcome {
            events,
            orders_paid,
            ..Default::default()
        }
    }

    /// Pull base then settlement from `from`. If the second pull fails the
    /// first is returned; a failed return is escrowed on the committed state.
    async fn pull_pair(
        &self,
        committed: &mut ExchangeState,
        from: &AccountId,
        base_amount: u128,
        settlement_amount: u128,
    ) -> ExecResult<()> {
        let exchange = &self.config.exchange_account;
        self.base
            .transfer_from(exchange, from, exchange, base_amount)
            .await?;

        if let Err(err) = self
            .settlement
            .transfer_from(exchange, from, exchange, settlement_amount)
            .await
        {
            if let Err(refund_err) = self.base.transfer(exchange, from, base_amount).await {
                warn!(
                    account = %from,
                    amount = base_amount,
                    error = %refund_err,
                    "Returning base deposit failed, escrowed"
                );
                committed.credit_escrow(from, AssetKind::Base, base_amount);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Execute payouts on the committed state, escrowing failures.
    async fn pay_out(
        &self,
        committed: &mut ExchangeState,
        transfers: Vec<Transfer>,
        outcome: &mut CallOutcome,
    ) {
        for transfer in transfers {
            let result = self
                .port(transfer.asset)
                .transfer(&self.config.exchange_account, &transfer.to, transfer.amount)
                .await;
            if let Err(err) = result {
                warn!(
                    account = %transfer.to,
                    asset = %transfer.asset,
                    amount = transfer.amount,
                    error = %err,
                    "Payout failed, escrowed"
                );
                committed.credit_escrow(&transfer.to, transfer.asset, transfer.amount);
                outcome.events.push(ExchangeEvent::PayoutEscrowed {
                    account: transfer.to,
                    asset: transfer.asset,
                    amount: transfer.amount,
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn reserves_event(reserves: Reserves) -> ExchangeEvent {
    ExchangeEvent::ReservesUpdated {
        base_reserve: reserves.base,
        settlement_reserve: reserves.settlement,
    }
}

fn withdrawal_transfers(to: &AccountId, change: &LiquidityChange) -> Vec<Transfer> {
    [
        (AssetKind::Base, change.base),
        (AssetKind::Settlement, change.settlement),
    ]
    .into_iter()
    .filter(|(_, amount)| *amount > 0)
    .map(|(asset, amount)| Transfer {
        to: to.clone(),
        asset,
        amount,
    })
    .collect()
}
