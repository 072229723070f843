//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Rates are read as decimals (`0.003` for a 0.3% fee) and converted to the
//! 18-decimal integers the settlement engine works in.

use crate::error::{DaemonError, DaemonResult};
use boxswap_domain::{AccountId, SCALE};
use boxswap_engine::SettlementParams;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Settings shared by every exchange the daemon creates
    pub exchange: ExchangeSettings,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Exchange settings.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Length of one order window in seconds
    pub window_secs: u64,
    /// Orders paid per call while a box is settling
    pub settle_budget: usize,
    /// Trading fee (0.003 = 0.3%)
    pub fee_rate: Decimal,
    /// Deviation limit orders tolerate (0.001 = 0.1%)
    pub tolerance_rate: Decimal,
    /// Deviation no settlement may exceed (0.05 = 5%)
    pub secure_rate: Decimal,
    /// Share of executed volume owed to the fee sink (0.0006 = 0.06%)
    pub lien_rate: Decimal,
    /// Account receiving swept fees
    pub fee_sink: String,
    /// Seconds between keeper passes
    pub keeper_interval_secs: u64,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let exchange = Self::load_exchange_settings()?;
        let log_json = Self::load_bool_env("BOXSWAP_LOG_JSON", false)?;

        // Fail at startup rather than on the first created exchange
        exchange.params()?;
        exchange.fee_sink()?;

        Ok(Self {
            api,
            exchange,
            log_json,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            exchange: ExchangeSettings {
                window_secs: 1,
                keeper_interval_secs: 1,
                ..ExchangeSettings::default()
            },
            log_json: false,
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("BOXSWAP_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid BOXSWAP_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("BOXSWAP_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("BOXSWAP_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_exchange_settings() -> DaemonResult<ExchangeSettings> {
        let defaults = ExchangeSettings::default();

        Ok(ExchangeSettings {
            window_secs: Self::load_parsed_env("BOXSWAP_WINDOW_SECS", defaults.window_secs)?,
            settle_budget: Self::load_parsed_env("BOXSWAP_SETTLE_BUDGET", defaults.settle_budget)?,
            fee_rate: Self::load_decimal_env("BOXSWAP_FEE_RATE", defaults.fee_rate)?,
            tolerance_rate: Self::load_decimal_env("BOXSWAP_TOLERANCE_RATE", defaults.tolerance_rate)?,
            secure_rate: Self::load_decimal_env("BOXSWAP_SECURE_RATE", defaults.secure_rate)?,
            lien_rate: Self::load_decimal_env("BOXSWAP_LIEN_RATE", defaults.lien_rate)?,
            fee_sink: env::var("BOXSWAP_FEE_SINK").unwrap_or(defaults.fee_sink),
            keeper_interval_secs: Self::load_parsed_env(
                "BOXSWAP_KEEPER_INTERVAL_SECS",
                defaults.keeper_interval_secs,
            )?,
        })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_bool_env(key: &str, default: bool) -> DaemonResult<bool> {
        match env::var(key) {
            Ok(val) => match val.to_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(true),
                "0" | "false" | "no" => Ok(false),
                _ => Err(DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            },
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            exchange: ExchangeSettings::default(),
            log_json: false,
            environment: Environment::Development,
        }
    }
}

impl ExchangeSettings {
    /// Engine parameters for these rates
    pub fn params(&self) -> DaemonResult<SettlementParams> {
        let one = Decimal::ONE;
        SettlementParams::new(
            to_scaled("fee rate", one + self.fee_rate)?,
            to_scaled("tolerance rate", one + self.tolerance_rate)?,
            to_scaled("secure rate", one + self.secure_rate)?,
            to_scaled("lien rate", self.lien_rate)?,
        )
        .map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Validated fee sink account
    pub fn fee_sink(&self) -> DaemonResult<AccountId> {
        AccountId::new(self.fee_sink.as_str())
            .map_err(|e| DaemonError::Config(format!("Invalid BOXSWAP_FEE_SINK: {}", e)))
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            window_secs: 15,
            settle_budget: 10,
            fee_rate: Decimal::new(3, 3),       // 0.3%
            tolerance_rate: Decimal::new(1, 3), // 0.1%
            secure_rate: Decimal::new(5, 2),    // 5%
            lien_rate: Decimal::new(6, 4),      // 0.06%
            fee_sink: "fee-sink".to_string(),
            keeper_interval_secs: 5,
        }
    }
}

/// Convert a decimal to an 18-decimal integer, refusing anything that would
/// lose precision.
fn to_scaled(name: &str, value: Decimal) -> DaemonResult<u128> {
    if value.is_sign_negative() {
        return Err(DaemonError::Config(format!("{} must not be negative: {}", name, value)));
    }
    let scaled = value
        .checked_mul(Decimal::from_i128_with_scale(SCALE as i128, 0))
        .ok_or_else(|| DaemonError::Config(format!("{} out of range: {}", name, value)))?;
    if !scaled.fract().is_zero() {
        return Err(DaemonError::Config(format!(
            "{} has more than 18 decimals: {}",
            name, value
        )));
    }
    scaled
        .to_u128()
        .ok_or_else(|| DaemonError::Config(format!("{} out of range: {}", name, value)))
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
