//! BoxSwap Storage Layer
//!
//! Provides persistence for exchange events and state snapshots.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing and development
//!
//! # Usage
//!
//! ```rust
//! use boxswap_domain::{AssetId, BoxId, ExchangeEvent};
//! use boxswap_store::{EventRepository, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let asset = AssetId::new("TKN").unwrap();
//!
//!     let seq = store
//!         .append(&asset, &ExchangeEvent::BoxSettled { box_id: BoxId::FIRST })
//!         .await
//!         .unwrap();
//!     println!("Appended event #{}", seq);
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{
    EventRepository, ExchangeSnapshot, SnapshotRepository, Store, StoredEvent,
};
