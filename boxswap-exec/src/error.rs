//! Execution layer error types.

use boxswap_domain::{DomainError, WindowId};
use boxswap_engine::EngineError;
use thiserror::Error;

/// Errors returned by exchange entry points.
///
/// Every error except a payout `TransferFailed` rejects the whole call with
/// no state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Zero or malformed amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A caller minimum was not met
    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(String),

    /// Burning more shares than owned
    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares {
        /// Shares requested
        requested: u128,
        /// Shares owned
        available: u128,
    },

    /// Deadline window has passed
    #[error("Expired: deadline window {deadline}, current window {current}")]
    Expired {
        /// Caller deadline
        deadline: WindowId,
        /// Window at call time
        current: WindowId,
    },

    /// A state-mutating call is already in progress on this exchange
    #[error("Re-entrant call rejected")]
    ReentrantCall,

    /// Overflow, underflow or reserve invariant breach
    #[error("Arithmetic fault: {0}")]
    ArithmeticFault(String),

    /// Asset transfer rejected
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Exchange has no liquidity yet
    #[error("Exchange not initialized")]
    NotInitialized,

    /// Exchange already has liquidity
    #[error("Exchange already initialized")]
    AlreadyInitialized,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<EngineError> for ExecError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ArithmeticFault(msg) => ExecError::ArithmeticFault(msg),
            EngineError::InvalidAmount(msg) => ExecError::InvalidAmount(msg),
            EngineError::SlippageExceeded(msg) => ExecError::SlippageExceeded(msg),
            EngineError::InsufficientShares {
                requested,
                available,
            } => ExecError::InsufficientShares {
                requested,
                available,
            },
            EngineError::NotInitialized => ExecError::NotInitialized,
            EngineError::AlreadyInitialized => ExecError::AlreadyInitialized,
            EngineError::InvalidParams(msg) => ExecError::Config(msg),
            EngineError::Domain(err) => err.into(),
        }
    }
}

impl From<DomainError> for ExecError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAmount(msg) => ExecError::InvalidAmount(msg),
            other => ExecError::InvalidState(other.to_string()),
        }
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
