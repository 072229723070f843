//! Daemon error types.

use boxswap_domain::{AssetId, DomainError};
use boxswap_exec::ExecError;
use boxswap_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No exchange for this asset
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(AssetId),

    /// An exchange for this asset already exists
    #[error("Exchange already exists: {0}")]
    ExchangeExists(AssetId),

    /// Box or order not held by the exchange
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown asset symbol
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Malformed or unacceptable request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation not available in this environment
    #[error("Not available in {0}")]
    Forbidden(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
