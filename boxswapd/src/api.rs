//! HTTP API for the BoxSwap daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Creating and inspecting exchanges
//! - Liquidity, orders, settlement, escrow claims and fee sweeps
//! - Funding accounts on the in-memory ledgers (outside production)
//!
//! Amounts are JSON integers in the asset's smallest unit.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

use boxswap_domain::{
    AccountId, AssetId, BoxId, Direction, EscrowBalance, LienAccrual, Order, OrderCategory,
    Reserves, SettlementCursor, WindowId,
};
use boxswap_exec::{
    AssetPort, BoxExchange, BoxSummary, CallOutcome, ExecError, ExecResult, SettlementStatus,
};

use crate::config::Environment;
use crate::error::{DaemonError, DaemonResult};
use crate::recorder::OutcomeRecorder;
use crate::registry::{ExchangeFactory, ExchangeHandle};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub factory: Arc<ExchangeFactory>,
    pub recorder: Arc<OutcomeRecorder>,
    pub environment: Environment,
}

impl ApiState {
    async fn lookup(&self, asset: &str) -> DaemonResult<(AssetId, ExchangeHandle)> {
        let asset = AssetId::new(asset)?;
        let handle = self.factory.get(&asset).await?;
        Ok((asset, handle))
    }

    /// Persist a finished call. Failed calls are checkpointed too, since fee
    /// sweeps and escrow claims can fail after moving part of the funds.
    async fn finish(
        &self,
        asset: &AssetId,
        exchange: &BoxExchange,
        result: ExecResult<CallOutcome>,
    ) -> DaemonResult<CallOutcome> {
        match result {
            Ok(outcome) => {
                self.recorder.record(asset, exchange, &outcome).await?;
                Ok(outcome)
            },
            Err(err) => {
                if let Err(e) = self.recorder.checkpoint(asset, exchange).await {
                    error!(%asset, error = %e, "Checkpoint after failed call");
                }
                Err(err.into())
            },
        }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Exchanges currently listed.
#[derive(Debug, Serialize)]
pub struct ExchangeListResponse {
    pub exchanges: Vec<AssetId>,
}

/// Request to list a new asset.
#[derive(Debug, Deserialize)]
pub struct CreateExchangeRequest {
    pub asset: String,
}

/// Pool and settlement state of one exchange.
#[derive(Debug, Serialize)]
pub struct ExchangeStatusResponse {
    pub asset: AssetId,
    pub current_window: WindowId,
    pub reserves: Reserves,
    #[serde(with = "boxswap_domain::amount")]
    pub total_shares: u128,
    pub accrued_fees: LienAccrual,
    pub settlement: SettlementStatus,
    pub unsettled_boxes: Vec<BoxId>,
}

/// First deposit.
#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    pub caller: String,
    #[serde(with = "boxswap_domain::amount")]
    pub settlement_amount: u128,
    #[serde(with = "boxswap_domain::amount")]
    pub base_amount: u128,
}

/// Proportional deposit.
#[derive(Debug, Deserialize)]
pub struct AddLiquidityRequest {
    pub caller: String,
    pub deadline: WindowId,
    #[serde(default)]
    #[serde(with = "boxswap_domain::amount")]
    pub min_shares: u128,
    #[serde(with = "boxswap_domain::amount")]
    pub base_amount: u128,
}

/// Share redemption.
#[derive(Debug, Deserialize)]
pub struct RemoveLiquidityRequest {
    pub caller: String,
    pub deadline: WindowId,
    #[serde(default)]
    #[serde(with = "boxswap_domain::amount")]
    pub min_base: u128,
    #[serde(default)]
    #[serde(with = "boxswap_domain::amount")]
    pub min_settlement: u128,
    #[serde(with = "boxswap_domain::amount")]
    pub shares: u128,
}

/// Order submission.
#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub caller: String,
    pub deadline: WindowId,
    pub direction: Direction,
    #[serde(with = "boxswap_domain::amount")]
    pub amount: u128,
    #[serde(default)]
    pub is_limit: bool,
}

/// Escrow claim.
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub caller: String,
}

/// Shares and escrow of one account.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: AccountId,
    #[serde(with = "boxswap_domain::amount")]
    pub shares: u128,
    pub escrow: EscrowBalance,
}

/// Mint test funds.
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub account: String,
    pub asset: String,
    #[serde(with = "boxswap_domain::amount")]
    pub amount: u128,
}

/// Balance after funding.
#[derive(Debug, Serialize)]
pub struct FundResponse {
    pub account: AccountId,
    pub asset: String,
    #[serde(with = "boxswap_domain::amount")]
    pub balance: u128,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/exchanges", get(list_exchanges_handler).post(create_exchange_handler))
        .route("/exchanges/:asset", get(exchange_status_handler))
        .route("/exchanges/:asset/initialize", post(initialize_handler))
        .route("/exchanges/:asset/liquidity/add", post(add_liquidity_handler))
        .route("/exchanges/:asset/liquidity/remove", post(remove_liquidity_handler))
        .route("/exchanges/:asset/orders", post(order_handler))
        .route("/exchanges/:asset/settle", post(settle_handler))
        .route("/exchanges/:asset/escrow/claim", post(claim_escrow_handler))
        .route("/exchanges/:asset/fees/sweep", post(sweep_fees_handler))
        .route("/exchanges/:asset/boxes/:box_id", get(box_handler))
        .route(
            "/exchanges/:asset/boxes/:box_id/orders/:category/:index",
            get(order_data_handler),
        )
        .route("/exchanges/:asset/accounts/:account", get(account_handler))
        .route("/dev/fund", post(fund_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /exchanges
async fn list_exchanges_handler(State(state): State<Arc<ApiState>>) -> Json<ExchangeListResponse> {
    Json(ExchangeListResponse {
        exchanges: state.factory.assets().await,
    })
}

/// POST /exchanges
async fn create_exchange_handler(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateExchangeRequest>,
) -> Result<(StatusCode, Json<ExchangeStatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    let result = async {
        let asset = AssetId::new(req.asset)?;
        let handle = state.factory.create_exchange(asset.clone()).await?;
        let exchange = handle.lock().await;
        state.recorder.checkpoint(&asset, &exchange).await?;
        status_of(&exchange)
    }
    .await;

    result
        .map(|status| (StatusCode::CREATED, Json(status)))
        .map_err(to_error_response)
}

/// GET /exchanges/:asset
async fn exchange_status_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
) -> ApiResult<ExchangeStatusResponse> {
    let result = async {
        let (_, handle) = state.lookup(&asset).await?;
        let exchange = handle.lock().await;
        status_of(&exchange)
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/initialize
async fn initialize_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
    Json(req): Json<InitializeRequest>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let caller = AccountId::new(req.caller)?;
        let exchange = handle.lock().await;
        let call = exchange
            .initialize_exchange(&caller, req.settlement_amount, req.base_amount)
            .await;
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/liquidity/add
async fn add_liquidity_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
    Json(req): Json<AddLiquidityRequest>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let caller = AccountId::new(req.caller)?;
        let exchange = handle.lock().await;
        let call = exchange
            .add_liquidity(&caller, req.deadline, req.min_shares, req.base_amount)
            .await;
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/liquidity/remove
async fn remove_liquidity_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
    Json(req): Json<RemoveLiquidityRequest>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let caller = AccountId::new(req.caller)?;
        let exchange = handle.lock().await;
        let call = exchange
            .remove_liquidity(&caller, req.deadline, req.min_base, req.min_settlement, req.shares)
            .await;
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/orders
async fn order_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
    Json(req): Json<OrderRequest>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let caller = AccountId::new(req.caller)?;
        let exchange = handle.lock().await;
        let call = match req.direction {
            Direction::BaseToSettlement => {
                exchange
                    .order_base_to_settlement(&caller, req.deadline, req.amount, req.is_limit)
                    .await
            },
            Direction::SettlementToBase => {
                exchange
                    .order_settlement_to_base(&caller, req.deadline, req.amount, req.is_limit)
                    .await
            },
        };
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/settle
async fn settle_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let exchange = handle.lock().await;
        let call = exchange.settle_pending_boxes().await;
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/escrow/claim
async fn claim_escrow_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let caller = AccountId::new(req.caller)?;
        let exchange = handle.lock().await;
        let call = exchange.claim_escrow(&caller).await;
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /exchanges/:asset/fees/sweep
async fn sweep_fees_handler(
    State(state): State<Arc<ApiState>>,
    Path(asset): Path<String>,
) -> ApiResult<CallOutcome> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let exchange = handle.lock().await;
        let call = exchange.sweep_fees_to_sink().await;
        state.finish(&asset, &exchange, call).await
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// GET /exchanges/:asset/boxes/:box_id
async fn box_handler(
    State(state): State<Arc<ApiState>>,
    Path((asset, box_id)): Path<(String, u64)>,
) -> ApiResult<BoxSummary> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let exchange = handle.lock().await;
        exchange
            .box_summary(BoxId::new(box_id))?
            .ok_or_else(|| DaemonError::NotFound(format!("box {} of {}", box_id, asset)))
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// GET /exchanges/:asset/boxes/:box_id/orders/:category/:index
async fn order_data_handler(
    State(state): State<Arc<ApiState>>,
    Path((asset, box_id, category, index)): Path<(String, u64, OrderCategory, usize)>,
) -> ApiResult<Order> {
    let result = async {
        let (asset, handle) = state.lookup(&asset).await?;
        let exchange = handle.lock().await;
        exchange
            .order_data(BoxId::new(box_id), category, index)?
            .ok_or_else(|| {
                DaemonError::NotFound(format!(
                    "order {} {} in box {} of {}",
                    category, index, box_id, asset
                ))
            })
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// GET /exchanges/:asset/accounts/:account
async fn account_handler(
    State(state): State<Arc<ApiState>>,
    Path((asset, account)): Path<(String, String)>,
) -> ApiResult<AccountResponse> {
    let result = async {
        let (_, handle) = state.lookup(&asset).await?;
        let account = AccountId::new(account)?;
        let exchange = handle.lock().await;
        Ok::<_, DaemonError>(AccountResponse {
            shares: exchange.shares_of(&account)?,
            escrow: exchange.escrow_of(&account)?,
            account,
        })
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

/// POST /dev/fund
async fn fund_handler(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<FundRequest>,
) -> ApiResult<FundResponse> {
    let result = async {
        if state.environment == Environment::Production {
            return Err(DaemonError::Forbidden(state.environment.to_string()));
        }
        let account = AccountId::new(req.account)?;
        state.factory.fund(&account, &req.asset, req.amount).await?;
        let ledger = state.factory.ledger(&req.asset).await?;
        Ok(FundResponse {
            balance: ledger.balance_of(&account).await?,
            asset: ledger.symbol().to_string(),
            account,
        })
    }
    .await;

    result.map(Json).map_err(to_error_response)
}

// =============================================================================
// Helpers
// =============================================================================

fn status_of(exchange: &BoxExchange) -> DaemonResult<ExchangeStatusResponse> {
    let cursor: Option<SettlementCursor> = exchange.cursor()?;
    Ok(ExchangeStatusResponse {
        asset: exchange.asset().clone(),
        current_window: exchange.current_window(),
        reserves: exchange.pool_amounts()?,
        total_shares: exchange.total_shares()?,
        accrued_fees: exchange.accrued_fees()?,
        settlement: SettlementStatus::from_cursor(cursor),
        unsettled_boxes: exchange.unsettled_boxes()?,
    })
}

fn exec_status(error: &ExecError) -> StatusCode {
    match error {
        ExecError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        ExecError::SlippageExceeded(_)
        | ExecError::InsufficientShares { .. }
        | ExecError::Expired { .. }
        | ExecError::ArithmeticFault(_)
        | ExecError::TransferFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ExecError::ReentrantCall
        | ExecError::NotInitialized
        | ExecError::AlreadyInitialized => StatusCode::CONFLICT,
        ExecError::InvalidState(_) | ExecError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::ExchangeNotFound(_)
        | DaemonError::UnknownAsset(_)
        | DaemonError::NotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::ExchangeExists(_) => StatusCode::CONFLICT,
        DaemonError::Forbidden(_) => StatusCode::FORBIDDEN,
        DaemonError::Exec(e) => exec_status(e),
        DaemonError::Store(_) | DaemonError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DaemonError::Domain(_) | DaemonError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================
