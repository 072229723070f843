//! Settlement parameters.
//!
//! All rates are 18-decimal fixed-point integers.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::SCALE;

/// 1.003: every order pays a 0.3% trading fee before meeting the pool.
pub const DEFAULT_FEE_FACTOR: u128 = 1_003_000_000_000_000_000;

/// 1.001: limit orders accept at most 0.1% deviation from the reference price.
pub const DEFAULT_TOLERANCE_RATE: u128 = 1_001_000_000_000_000_000;

/// 1.05: no settlement may move the price more than 5%.
pub const DEFAULT_SECURE_RATE: u128 = 1_050_000_000_000_000_000;

/// 0.0006: share of post-fee executed volume owed to the fee sink.
pub const DEFAULT_LIEN_RATE: u128 = 600_000_000_000_000;

/// Rates used by the price resolver and refund allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementParams {
    /// One plus the trading fee; also the "fully refunded" sentinel
    #[serde(with = "boxswap_domain::amount")]
    pub fee_factor: u128,
    /// One plus the tolerated deviation for limit orders
    #[serde(with = "boxswap_domain::amount")]
    pub tolerance_rate: u128,
    /// One plus the absolute deviation ceiling
    #[serde(with = "boxswap_domain::amount")]
    pub secure_rate: u128,
    /// Protocol share of executed volume
    #[serde(with = "boxswap_domain::amount")]
    pub lien_rate: u128,
}

impl SettlementParams {
    /// Build and validate parameters
    pub fn new(
        fee_factor: u128,
        tolerance_rate: u128,
        secure_rate: u128,
        lien_rate: u128,
    ) -> EngineResult<Self> {
        let params = Self {
            fee_factor,
            tolerance_rate,
            secure_rate,
            lien_rate,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check that the bands are ordered and below 2x
    pub fn validate(&self) -> EngineResult<()> {
        if self.fee_factor < SCALE || self.fee_factor >= 2 * SCALE {
            return Err(EngineError::InvalidParams(format!(
                "fee factor {} must be in [1, 2)",
                self.fee_factor
            )));
        }
        if self.tolerance_rate < SCALE || self.tolerance_rate >= 2 * SCALE {
            return Err(EngineError::InvalidParams(format!(
                "tolerance rate {} must be in [1, 2)",
                self.tolerance_rate
            )));
        }
        if self.secure_rate < self.tolerance_rate || self.secure_rate >= 2 * SCALE {
            return Err(EngineError::InvalidParams(format!(
                "secure rate {} must be in [tolerance rate, 2)",
                self.secure_rate
            )));
        }
        if self.lien_rate > self.fee_factor - SCALE {
            return Err(EngineError::InvalidParams(format!(
                "lien rate {} must not exceed the trading fee",
                self.lien_rate
            )));
        }
        Ok(())
    }
}

impl Default for SettlementParams {
    fn default() -> Self {
        Self {
            fee_factor: DEFAULT_FEE_FACTOR,
            tolerance_rate: DEFAULT_TOLERANCE_RATE,
            secure_rate: DEFAULT_SECURE_RATE,
            lien_rate: DEFAULT_LIEN_RATE,
        }
    }
}
