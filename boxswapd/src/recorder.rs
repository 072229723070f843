//! Persists call outcomes.
//!
//! Every successful call appends its events to the exchange's log and then
//! refreshes the exchange snapshot, so a restart resumes from the last
//! recorded state.

use std::sync::Arc;

use tracing::debug;

use boxswap_domain::AssetId;
use boxswap_exec::{BoxExchange, CallOutcome, ExchangeState};
use boxswap_store::{ExchangeSnapshot, Store};

use crate::error::DaemonResult;

/// Writes outcomes and snapshots to a store.
pub struct OutcomeRecorder {
    store: Arc<dyn Store>,
}

impl OutcomeRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Append the outcome's events, then snapshot the exchange.
    ///
    /// Must be called while the caller still holds the exchange handle, so
    /// the snapshot matches the events.
    pub async fn record(
        &self,
        asset: &AssetId,
        exchange: &BoxExchange,
        outcome: &CallOutcome,
    ) -> DaemonResult<()> {
        for event in &outcome.events {
            self.store.events().append(asset, event).await?;
        }
        if !outcome.events.is_empty() {
            self.checkpoint(asset, exchange).await?;
        }
        Ok(())
    }

    /// Snapshot the current state of an exchange.
    pub async fn checkpoint(&self, asset: &AssetId, exchange: &BoxExchange) -> DaemonResult<()> {
        let state = exchange.snapshot()?;
        let last_seq = self.store.events().get_latest_seq(asset).await?.unwrap_or(0);
        let snapshot =
            ExchangeSnapshot::encode(asset.clone(), exchange.current_window(), last_seq, &state)?;
        self.store.snapshots().save(&snapshot).await?;

        debug!(%asset, last_seq, "Exchange snapshot saved");
        Ok(())
    }

    /// Latest saved state of every exchange
    pub async fn load(&self) -> DaemonResult<Vec<(AssetId, ExchangeState)>> {
        let mut states = Vec::new();
        for asset in self.store.snapshots().exchanges().await? {
            if let Some(snapshot) = self.store.snapshots().latest(&asset).await? {
                states.push((asset, snapshot.decode()?));
            }
        }
        Ok(states)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::{AccountId, WindowId};
    use boxswap_exec::{AssetPort, ExchangeConfig, ManualClock, StubAsset};
    use boxswap_store::{MemoryStore, SnapshotRepository};

    #[tokio::test]
    async fn test_record_and_load() {
        let store = Arc::new(MemoryStore::new());
        let recorder = OutcomeRecorder::new(store.clone());
        let tkn = AssetId::new("TKN").unwrap();
        let me = AccountId::new("exchange-tkn").unwrap();
        let lp = AccountId::new("lp").unwrap();

        let base = Arc::new(StubAsset::new("BASE"));
        let token = Arc::new(StubAsset::new("TKN"));
        base.mint(&lp, 200_000);
        token.mint(&lp, 100_000);
        base.approve(&lp, &me, u128::MAX).await.unwrap();
        token.approve(&lp, &me, u128::MAX).await.unwrap();

        let config = ExchangeConfig::new(tkn.clone(), me, AccountId::new("sink").unwrap());
        let exchange =
            BoxExchange::new(config, base, token, Arc::new(ManualClock::new(3))).unwrap();
        let outcome = exchange.initialize_exchange(&lp, 100_000, 200_000).await.unwrap();

        recorder.record(&tkn, &exchange, &outcome).await.unwrap();

        assert_eq!(store.event_count(), outcome.events.len());
        let latest = store.latest(&tkn).await.unwrap().unwrap();
        assert_eq!(latest.last_seq, outcome.events.len() as i64);
        assert_eq!(latest.window, WindowId::new(3));
        // minted shares exceed u64 and are kept exactly
        assert!(latest.state.contains("\"1000000000000000000000\""));

        let loaded = recorder.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1, exchange.snapshot().unwrap());
    }

    #[tokio::test]
    async fn test_empty_outcome_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let recorder = OutcomeRecorder::new(store.clone());
        let tkn = AssetId::new("TKN").unwrap();
        let config = ExchangeConfig::new(
            tkn.clone(),
            AccountId::new("exchange-tkn").unwrap(),
            AccountId::new("sink").unwrap(),
        );
        let exchange = BoxExchange::new(
            config,
            Arc::new(StubAsset::new("BASE")),
            Arc::new(StubAsset::new("TKN")),
            Arc::new(ManualClock::new(1)),
        )
        .unwrap();

        recorder.record(&tkn, &exchange, &CallOutcome::default()).await.unwrap();
        assert_eq!(store.event_count(), 0);
        assert_eq!(store.snapshot_count(), 0);
    }
}
