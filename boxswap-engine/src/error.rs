//! Engine error types.

use boxswap_domain::DomainError;
use thiserror::Error;

/// Errors raised by pure settlement and pool computations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Overflow, underflow, division by zero or a reserve invariant breach
    #[error("Arithmetic fault: {0}")]
    ArithmeticFault(String),

    /// Zero or otherwise unusable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A caller-supplied minimum was not met
    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(String),

    /// Burning more shares than owned
    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares {
        /// Shares the caller asked to burn
        requested: u128,
        /// Shares the caller owns
        available: u128,
    },

    /// Pool has no liquidity yet
    #[error("Pool not initialized")]
    NotInitialized,

    /// Pool already holds liquidity
    #[error("Pool already initialized")]
    AlreadyInitialized,

    /// Settlement parameters out of range
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl EngineError {
    /// Shorthand for an arithmetic fault
    pub fn fault(context: impl Into<String>) -> Self {
        Self::ArithmeticFault(context.into())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
