//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for exchange events and state
//! snapshots. Implementations can be in-memory or a database.

use async_trait::async_trait;
use boxswap_domain::{AssetId, ExchangeEvent, WindowId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

// =============================================================================
// Records
// =============================================================================

/// An event as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Time-ordered identifier
    pub id: Uuid,
    /// Position in the log of its exchange, starting at 1
    pub seq: i64,
    /// Exchange the event belongs to
    pub exchange: AssetId,
    /// When the event was appended
    pub recorded_at: DateTime<Utc>,
    /// The event itself
    pub event: ExchangeEvent,
}

/// Serialized exchange state at a point in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSnapshot {
    /// Exchange the state belongs to
    pub exchange: AssetId,
    /// Window at the time of the snapshot
    pub window: WindowId,
    /// Last event sequence reflected in the state
    pub last_seq: i64,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// State encoded as a JSON document
    pub state: String,
}

impl ExchangeSnapshot {
    /// Encode a state value
    pub fn encode<T: Serialize>(
        exchange: AssetId,
        window: WindowId,
        last_seq: i64,
        state: &T,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            exchange,
            window,
            last_seq,
            taken_at: Utc::now(),
            state: serde_json::to_string(state)?,
        })
    }

    /// Decode the state value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_str(&self.state)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

// =============================================================================
// Repositories
// =============================================================================

/// Repository for exchange events (append-only)
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event to the log of an exchange, returning its sequence
    async fn append(&self, exchange: &AssetId, event: &ExchangeEvent) -> Result<i64, StoreError>;

    /// Load all events of an exchange (in order)
    async fn find_by_exchange(&self, exchange: &AssetId) -> Result<Vec<StoredEvent>, StoreError>;

    /// Load events of an exchange after a given sequence number
    async fn find_by_exchange_after(
        &self,
        exchange: &AssetId,
        after_seq: i64,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    /// Get the latest event sequence number of an exchange
    async fn get_latest_seq(&self, exchange: &AssetId) -> Result<Option<i64>, StoreError>;
}

/// Repository for exchange state snapshots (latest wins)
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Store a snapshot, replacing an older one for the same exchange
    ///
    /// # Errors
    /// `StaleSnapshot` if the stored snapshot covers a later sequence
    async fn save(&self, snapshot: &ExchangeSnapshot) -> Result<(), StoreError>;

    /// Latest snapshot of an exchange
    async fn latest(&self, exchange: &AssetId) -> Result<Option<ExchangeSnapshot>, StoreError>;

    /// Exchanges with a stored snapshot
    async fn exchanges(&self) -> Result<Vec<AssetId>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get event repository
    fn events(&self) -> &dyn EventRepository;

    /// Get snapshot repository
    fn snapshots(&self) -> &dyn SnapshotRepository;
}
