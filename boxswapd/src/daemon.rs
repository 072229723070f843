//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together:
//! - Exchange registry (one exchange per listed asset)
//! - Outcome recorder (event log and snapshots)
//! - API Server (HTTP endpoints)
//! - Keeper (periodic settlement of sealed boxes)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Restore exchanges from their latest snapshots
//! 3. Start API server
//! 4. Keeper loop until SIGINT
//! 5. Checkpoint every exchange and exit

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use boxswap_exec::SystemClock;
use boxswap_store::MemoryStore;

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::recorder::OutcomeRecorder;
use crate::registry::ExchangeFactory;

// =============================================================================
// Daemon
// =============================================================================

/// The main BoxSwap daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Listed exchanges
    factory: Arc<ExchangeFactory>,
    /// Persistence of call outcomes
    recorder: Arc<OutcomeRecorder>,
}

impl Daemon {
    /// Create a daemon with in-memory ledgers, store and a wall-clock window.
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        let clock = Arc::new(SystemClock::new(config.exchange.window_secs));
        let factory = Arc::new(ExchangeFactory::new(&config.exchange, clock)?);
        let recorder = Arc::new(OutcomeRecorder::new(Arc::new(MemoryStore::new())));

        Ok(Self::new(config, factory, recorder))
    }

    /// Create a new daemon with provided components.
    pub fn new(
        config: Config,
        factory: Arc<ExchangeFactory>,
        recorder: Arc<OutcomeRecorder>,
    ) -> Self {
        Self {
            config,
            factory,
            recorder,
        }
    }

    /// Listed exchanges
    pub fn factory(&self) -> &Arc<ExchangeFactory> {
        &self.factory
    }

    /// Run the daemon until a shutdown signal.
    pub async fn run(&self) -> DaemonResult<()> {
        info!(environment = %self.config.environment, "Starting BoxSwap daemon");

        // 1. Restore exchanges
        let restored = self.restore_exchanges().await?;
        info!(restored, "Exchanges restored");

        // 2. Start API server
        let addr = self.start_api_server().await?;
        info!(%addr, "API server listening");

        // 3. Keeper loop
        let period = Duration::from_secs(self.config.exchange.keeper_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.keeper_pass().await;
                }

                // Handle shutdown signals
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // 4. Graceful shutdown
        self.shutdown().await
    }

    /// Re-create every exchange with a saved snapshot.
    pub async fn restore_exchanges(&self) -> DaemonResult<usize> {
        let states = self.recorder.load().await?;
        let count = states.len();
        for (asset, state) in states {
            self.factory.restore_exchange(asset, state).await?;
        }
        Ok(count)
    }

    /// Settle pending boxes on every exchange. Returns the orders paid.
    ///
    /// Failures are logged and do not stop the pass.
    pub async fn keeper_pass(&self) -> usize {
        let mut paid = 0;
        for asset in self.factory.assets().await {
            let handle = match self.factory.get(&asset).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(%asset, error = %e, "Exchange vanished during keeper pass");
                    continue;
                },
            };
            let exchange = handle.lock().await;

            match exchange.settle_pending_boxes().await {
                Ok(outcome) => {
                    paid += outcome.orders_paid;
                    if let Err(e) = self.recorder.record(&asset, &exchange, &outcome).await {
                        error!(%asset, error = %e, "Failed to record keeper outcome");
                    }
                    if outcome.orders_paid > 0 {
                        info!(
                            %asset,
                            orders_paid = outcome.orders_paid,
                            settling = outcome.settlement.is_settling(),
                            "Keeper settled orders"
                        );
                    }
                },
                Err(e) => error!(%asset, error = %e, "Keeper settlement failed"),
            }
        }
        paid
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            factory: self.factory.clone(),
            recorder: self.recorder.clone(),
            environment: self.config.environment,
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Checkpoint every exchange.
    async fn shutdown(&self) -> DaemonResult<()> {
        info!("Initiating graceful shutdown");

        let assets = self.factory.assets().await;
        for asset in &assets {
            let handle = self.factory.get(asset).await?;
            let exchange = handle.lock().await;
            self.recorder.checkpoint(asset, &exchange).await?;
        }

        info!(exchanges = assets.len(), "Shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::{AccountId, AssetId, WindowId};
    use boxswap_exec::ManualClock;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn daemon_with_clock() -> (Daemon, Arc<ManualClock>, Arc<MemoryStore>) {
        let config = Config::test();
        let clock = Arc::new(ManualClock::new(1));
        let store = Arc::new(MemoryStore::new());
        let factory = Arc::new(ExchangeFactory::new(&config.exchange, clock.clone()).unwrap());
        let recorder = Arc::new(OutcomeRecorder::new(store.clone()));
        (Daemon::new(config, factory, recorder), clock, store)
    }

    #[tokio::test]
    async fn test_daemon_creation() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();
        assert!(daemon.factory().is_empty().await);
        assert_eq!(daemon.restore_exchanges().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();
        let addr = daemon.start_api_server().await.unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("healthy"));
    }

    #[tokio::test]
    async fn test_keeper_pass_settles_sealed_boxes() {
        let (daemon, clock, store) = daemon_with_clock();
        let factory = daemon.factory().clone();
        let tkn = AssetId::new("TKN").unwrap();
        let (lp, trader) = (AccountId::new("lp").unwrap(), AccountId::new("trader").unwrap());

        factory.create_exchange(tkn.clone()).await.unwrap();
        factory.fund(&lp, "BASE", 200_000).await.unwrap();
        factory.fund(&lp, "TKN", 100_000).await.unwrap();
        factory.fund(&trader, "BASE", 200).await.unwrap();
        {
            let handle = factory.get(&tkn).await.unwrap();
            let exchange = handle.lock().await;
            exchange.initialize_exchange(&lp, 100_000, 200_000).await.unwrap();
            exchange
                .order_base_to_settlement(&trader, WindowId::new(5), 200, false)
                .await
                .unwrap();
        }

        // box still open
        assert_eq!(daemon.keeper_pass().await, 0);
        assert_eq!(store.event_count(), 0);

        clock.advance();
        assert_eq!(daemon.keeper_pass().await, 1);
        assert_eq!(factory.ledger("TKN").await.unwrap().balance(&trader), 99);
        assert!(store.event_count() > 0);
        assert_eq!(store.snapshot_count(), 1);

        // nothing left
        assert_eq!(daemon.keeper_pass().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_checkpoints_exchanges() {
        let (daemon, _clock, store) = daemon_with_clock();
        daemon
            .factory()
            .create_exchange(AssetId::new("TKN").unwrap())
            .await
            .unwrap();

        daemon.shutdown().await.unwrap();
        assert_eq!(store.snapshot_count(), 1);
    }
}
