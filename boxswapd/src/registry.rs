//! Exchange registry.
//!
//! One exchange per settlement asset. Every exchange shares the base asset,
//! the window clock and the fee sink; each gets its own settlement asset and
//! custody account.
//!
//! Assets are in-memory `StubAsset` ledgers, so balances live as long as the
//! process does.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use boxswap_domain::{AccountId, AssetId};
use boxswap_engine::SettlementParams;
use boxswap_exec::{
    AssetPort, BoxExchange, ExchangeConfig, ExchangeState, StubAsset, WindowClock,
};

use crate::config::ExchangeSettings;
use crate::error::{DaemonError, DaemonResult};

/// Symbol of the asset every exchange quotes against.
pub const BASE_SYMBOL: &str = "BASE";

/// Shared handle to one exchange.
///
/// Callers hold the lock for the whole call, views included, so concurrent
/// requests queue instead of tripping the exchange's re-entrancy guard.
pub type ExchangeHandle = Arc<Mutex<BoxExchange>>;

#[derive(Clone)]
struct Listing {
    exchange: ExchangeHandle,
    token: Arc<StubAsset>,
}

/// Creates and looks up exchanges.
pub struct ExchangeFactory {
    params: SettlementParams,
    budget: usize,
    fee_sink: AccountId,
    base: Arc<StubAsset>,
    clock: Arc<dyn WindowClock>,
    listings: RwLock<BTreeMap<AssetId, Listing>>,
}

impl ExchangeFactory {
    /// Build a factory from validated settings.
    pub fn new(settings: &ExchangeSettings, clock: Arc<dyn WindowClock>) -> DaemonResult<Self> {
        if settings.settle_budget == 0 {
            return Err(DaemonError::Config("BOXSWAP_SETTLE_BUDGET must be positive".to_string()));
        }
        Ok(Self {
            params: settings.params()?,
            budget: settings.settle_budget,
            fee_sink: settings.fee_sink()?,
            base: Arc::new(StubAsset::new(BASE_SYMBOL)),
            clock,
            listings: RwLock::new(BTreeMap::new()),
        })
    }

    /// Create an empty exchange for `asset`.
    ///
    /// # Errors
    /// `ExchangeExists` if the asset already has one
    pub async fn create_exchange(&self, asset: AssetId) -> DaemonResult<ExchangeHandle> {
        let handle = self.insert(asset.clone(), ExchangeState::new()).await?;
        info!(%asset, sink = %self.fee_sink, "Exchange created");
        Ok(handle)
    }

    /// Re-create an exchange from saved state.
    pub async fn restore_exchange(
        &self,
        asset: AssetId,
        state: ExchangeState,
    ) -> DaemonResult<ExchangeHandle> {
        let boxes = state.boxes().count();
        let handle = self.insert(asset.clone(), state).await?;
        info!(%asset, boxes, "Exchange restored");
        Ok(handle)
    }

    /// Look up the exchange for `asset`.
    pub async fn get(&self, asset: &AssetId) -> DaemonResult<ExchangeHandle> {
        self.listings
            .read()
            .await
            .get(asset)
            .map(|l| l.exchange.clone())
            .ok_or_else(|| DaemonError::ExchangeNotFound(asset.clone()))
    }

    /// Assets with an exchange, in order
    pub async fn assets(&self) -> Vec<AssetId> {
        self.listings.read().await.keys().cloned().collect()
    }

    /// Number of exchanges
    pub async fn len(&self) -> usize {
        self.listings.read().await.len()
    }

    /// Whether no exchange exists yet
    pub async fn is_empty(&self) -> bool {
        self.listings.read().await.is_empty()
    }

    /// The shared base asset
    pub fn base(&self) -> Arc<StubAsset> {
        self.base.clone()
    }

    /// Ledger for a symbol: the base asset or a listed settlement asset.
    pub async fn ledger(&self, symbol: &str) -> DaemonResult<Arc<StubAsset>> {
        if symbol.eq_ignore_ascii_case(BASE_SYMBOL) {
            return Ok(self.base.clone());
        }
        let asset = AssetId::new(symbol).map_err(|_| DaemonError::UnknownAsset(symbol.to_string()))?;
        self.listings
            .read()
            .await
            .get(&asset)
            .map(|l| l.token.clone())
            .ok_or_else(|| DaemonError::UnknownAsset(symbol.to_string()))
    }

    /// Mint `amount` of `symbol` to `account` and let every exchange that
    /// trades the asset pull from it.
    pub async fn fund(&self, account: &AccountId, symbol: &str, amount: u128) -> DaemonResult<()> {
        let ledger = self.ledger(symbol).await?;
        ledger.mint(account, amount);

        let listings = self.listings.read().await;
        let spenders: Vec<AssetId> = if symbol.eq_ignore_ascii_case(BASE_SYMBOL) {
            listings.keys().cloned().collect()
        } else {
            listings.keys().filter(|a| a.as_str() == ledger.symbol()).cloned().collect()
        };
        for asset in spenders {
            ledger.approve(account, &custody_account(&asset)?, u128::MAX).await?;
        }

        info!(%account, asset = ledger.symbol(), amount, "Account funded");
        Ok(())
    }

    async fn insert(&self, asset: AssetId, state: ExchangeState) -> DaemonResult<ExchangeHandle> {
        if asset.as_str() == BASE_SYMBOL {
            return Err(DaemonError::InvalidRequest(format!(
                "{} is the base asset",
                BASE_SYMBOL
            )));
        }

        let mut listings = self.listings.write().await;
        if listings.contains_key(&asset) {
            return Err(DaemonError::ExchangeExists(asset));
        }

        let mut config =
            ExchangeConfig::new(asset.clone(), custody_account(&asset)?, self.fee_sink.clone());
        config.params = self.params;
        config.budget = self.budget;

        let token = Arc::new(StubAsset::new(asset.as_str()));
        let exchange = BoxExchange::restore(
            config,
            self.base.clone(),
            token.clone(),
            self.clock.clone(),
            state,
        )?;
        let handle = Arc::new(Mutex::new(exchange));

        listings.insert(
            asset,
            Listing {
                exchange: handle.clone(),
                token,
            },
        );
        Ok(handle)
    }
}

/// Account holding the reserves of the exchange for `asset`
pub fn custody_account(asset: &AssetId) -> DaemonResult<AccountId> {
    Ok(AccountId::new(format!("exchange-{}", asset.as_str().to_lowercase()))?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::WindowId;
    use boxswap_exec::ManualClock;

    fn factory() -> ExchangeFactory {
        ExchangeFactory::new(&ExchangeSettings::default(), Arc::new(ManualClock::new(1))).unwrap()
    }

    fn asset(symbol: &str) -> AssetId {
        AssetId::new(symbol).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let factory = factory();
        factory.create_exchange(asset("tkn")).await.unwrap();

        let exchange = factory.get(&asset("TKN")).await.unwrap();
        let exchange = exchange.lock().await;
        assert_eq!(exchange.asset().as_str(), "TKN");
        assert_eq!(exchange.config().fee_sink.as_str(), "fee-sink");
        assert_eq!(exchange.config().exchange_account.as_str(), "exchange-tkn");
        assert_eq!(factory.assets().await, vec![asset("TKN")]);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let factory = factory();
        factory.create_exchange(asset("TKN")).await.unwrap();

        let result = factory.create_exchange(asset("tkn")).await;
        assert!(matches!(result, Err(DaemonError::ExchangeExists(_))));
        assert_eq!(factory.len().await, 1);
    }

    #[tokio::test]
    async fn test_base_symbol_reserved() {
        let factory = factory();
        let result = factory.create_exchange(asset("base")).await;
        assert!(matches!(result, Err(DaemonError::InvalidRequest(_))));
        assert!(factory.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_exchange() {
        let factory = factory();
        assert!(matches!(
            factory.get(&asset("NOPE")).await,
            Err(DaemonError::ExchangeNotFound(_))
        ));
        assert!(matches!(
            factory.ledger("NOPE").await,
            Err(DaemonError::UnknownAsset(_))
        ));
    }

    #[tokio::test]
    async fn test_funded_account_can_trade() {
        let factory = factory();
        factory.create_exchange(asset("TKN")).await.unwrap();
        let (lp, trader) = (AccountId::new("lp").unwrap(), AccountId::new("trader").unwrap());

        factory.fund(&lp, "base", 200_000).await.unwrap();
        factory.fund(&lp, "TKN", 100_000).await.unwrap();
        factory.fund(&trader, "BASE", 500).await.unwrap();

        let exchange = factory.get(&asset("TKN")).await.unwrap();
        let exchange = exchange.lock().await;
        exchange.initialize_exchange(&lp, 100_000, 200_000).await.unwrap();
        exchange
            .order_base_to_settlement(&trader, WindowId::new(5), 200, false)
            .await
            .unwrap();

        assert_eq!(factory.base().balance(&trader), 300);
        assert_eq!(factory.base().balance(&custody_account(&asset("TKN")).unwrap()), 200_200);
    }
}
