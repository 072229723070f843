//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use boxswap_domain::{AssetId, ExchangeEvent};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::repository::{
    EventRepository, ExchangeSnapshot, SnapshotRepository, Store, StoredEvent,
};

/// In-memory store for testing
pub struct MemoryStore {
    events: RwLock<Vec<StoredEvent>>,
    /// Next sequence number per exchange
    seqs: RwLock<HashMap<AssetId, i64>>,
    snapshots: RwLock<HashMap<AssetId, ExchangeSnapshot>>,
    /// Total appends, across exchanges
    appended: AtomicI64,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            seqs: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            appended: AtomicI64::new(0),
        }
    }

    /// Get the number of events
    pub fn event_count(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Get the number of snapshots
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total appends since creation or the last `clear`
    pub fn appended(&self) -> i64 {
        self.appended.load(Ordering::SeqCst)
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.events.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.seqs.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.snapshots.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.appended.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Event Repository Implementation
// =============================================================================

#[async_trait]
impl EventRepository for MemoryStore {
    async fn append(&self, exchange: &AssetId, event: &ExchangeEvent) -> Result<i64, StoreError> {
        // Sequence and log are updated under the log lock so readers never
        // see a gap.
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        let seq = {
            let mut seqs = self.seqs.write().unwrap_or_else(PoisonError::into_inner);
            let next = seqs.entry(exchange.clone()).or_insert(0);
            *next += 1;
            *next
        };

        events.push(StoredEvent {
            id: Uuid::now_v7(),
            seq,
            exchange: exchange.clone(),
            recorded_at: Utc::now(),
            event: event.clone(),
        });
        self.appended.fetch_add(1, Ordering::SeqCst);

        debug!(%exchange, seq, event_type = event.event_type(), "Event appended");
        Ok(seq)
    }

    async fn find_by_exchange(&self, exchange: &AssetId) -> Result<Vec<StoredEvent>, StoreError> {
        self.find_by_exchange_after(exchange, 0).await
    }

    async fn find_by_exchange_after(
        &self,
        exchange: &AssetId,
        after_seq: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events
            .iter()
            .filter(|e| &e.exchange == exchange && e.seq > after_seq)
            .cloned()
            .collect())
    }

    async fn get_latest_seq(&self, exchange: &AssetId) -> Result<Option<i64>, StoreError> {
        let seqs = self.seqs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(seqs.get(exchange).copied())
    }
}

// =============================================================================
// Snapshot Repository Implementation
// =============================================================================

#[async_trait]
impl SnapshotRepository for MemoryStore {
    async fn save(&self, snapshot: &ExchangeSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stored) = snapshots.get(&snapshot.exchange) {
            if stored.last_seq > snapshot.last_seq {
                return Err(StoreError::StaleSnapshot {
                    exchange: snapshot.exchange.to_string(),
                    offered: snapshot.last_seq,
                    stored: stored.last_seq,
                });
            }
        }
        snapshots.insert(snapshot.exchange.clone(), snapshot.clone());
        Ok(())
    }

    async fn latest(&self, exchange: &AssetId) -> Result<Option<ExchangeSnapshot>, StoreError> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(exchange).cloned())
    }

    async fn exchanges(&self) -> Result<Vec<AssetId>, StoreError> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        let mut assets: Vec<AssetId> = snapshots.keys().cloned().collect();
        assets.sort();
        Ok(assets)
    }
}

// =============================================================================
// Combined Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn events(&self) -> &dyn EventRepository {
        self
    }

    fn snapshots(&self) -> &dyn SnapshotRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use boxswap_domain::{BoxId, WindowId};
    use serde_json::json;

    fn asset(symbol: &str) -> AssetId {
        AssetId::new(symbol).unwrap()
    }

    fn create_test_event(id: u64) -> ExchangeEvent {
        ExchangeEvent::BoxSettled { box_id: BoxId::new(id) }
    }

    #[tokio::test]
    async fn test_event_append_and_find() {
        let store = MemoryStore::new();
        let tkn = asset("TKN");

        let seq1 = store.append(&tkn, &create_test_event(1)).await.unwrap();
        let seq2 = store.append(&tkn, &create_test_event(2)).await.unwrap();

        assert_eq!(seq1, 1);
        assert_eq!(seq2, 2);
        assert_eq!(store.event_count(), 2);

        let events = store.find_by_exchange(&tkn).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, create_test_event(2));
        assert_ne!(events[0].id, events[1].id);
    }

    #[tokio::test]
    async fn test_sequences_are_per_exchange() {
        let store = MemoryStore::new();
        let (a, b) = (asset("AAA"), asset("BBB"));

        store.append(&a, &create_test_event(1)).await.unwrap();
        store.append(&a, &create_test_event(2)).await.unwrap();
        let first_b = store.append(&b, &create_test_event(1)).await.unwrap();

        assert_eq!(first_b, 1);
        assert_eq!(store.get_latest_seq(&a).await.unwrap(), Some(2));
        assert_eq!(store.get_latest_seq(&asset("CCC")).await.unwrap(), None);
        assert_eq!(store.appended(), 3);

        let after = store.find_by_exchange_after(&a, 1).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].seq, 2);
    }

    #[tokio::test]
    async fn test_snapshot_latest_wins() {
        let store = MemoryStore::new();
        let tkn = asset("TKN");

        let old = ExchangeSnapshot::encode(tkn.clone(), WindowId::new(1), 3, &json!({"v": 1})).unwrap();
        let new = ExchangeSnapshot::encode(tkn.clone(), WindowId::new(2), 7, &json!({"v": 2})).unwrap();

        store.save(&old).await.unwrap();
        store.save(&new).await.unwrap();
        assert!(matches!(
            store.save(&old).await,
            Err(StoreError::StaleSnapshot { offered: 3, stored: 7, .. })
        ));

        let latest = store.latest(&tkn).await.unwrap().unwrap();
        assert_eq!(latest.last_seq, 7);
        let decoded: serde_json::Value = latest.decode().unwrap();
        assert_eq!(decoded["v"], 2);
        assert_eq!(store.exchanges().await.unwrap(), vec![tkn]);
    }

    #[tokio::test]
    async fn test_snapshot_decode_type_mismatch() {
        let snapshot =
            ExchangeSnapshot::encode(asset("TKN"), WindowId::new(1), 0, &json!("text")).unwrap();
        let result: Result<u64, _> = snapshot.decode();
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_snapshot_keeps_wide_integers() {
        let store = MemoryStore::new();
        let tkn = asset("TKN");
        let shares: u128 = 1_000_000_000_000_000_000_000;

        let snapshot = ExchangeSnapshot::encode(tkn.clone(), WindowId::new(1), 1, &shares).unwrap();
        store.save(&snapshot).await.unwrap();

        let latest = store.latest(&tkn).await.unwrap().unwrap();
        assert_eq!(latest.decode::<u128>().unwrap(), shares);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.append(&asset("TKN"), &create_test_event(1)).await.unwrap();
        store.clear();
        assert_eq!(store.event_count(), 0);
        assert_eq!(store.get_latest_seq(&asset("TKN")).await.unwrap(), None);
    }
}
