//! Value Objects for the BoxSwap Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scale shared by prices, rates and share balances (18 decimals).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Account identity must be well formed
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Asset identity must be well formed
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    /// Order does not belong to the box it was pushed into
    #[error("Box mismatch: {0}")]
    BoxMismatch(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Identities
// =============================================================================

fn validate_identity(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must be non-empty");
    }
    if value.len() > 128 {
        return Err("must be at most 128 characters");
    }
    if value.chars().any(char::is_whitespace) {
        return Err("must not contain whitespace");
    }
    Ok(())
}

/// Identity of an orderer, liquidity provider or fee sink.
///
/// # Invariants
/// - Non-empty, no whitespace, at most 128 characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Create a new AccountId with validation
    ///
    /// # Examples
    /// ```
    /// # use boxswap_domain::value_objects::AccountId;
    /// let alice = AccountId::new("alice").unwrap();
    /// assert_eq!(alice.as_str(), "alice");
    /// assert!(AccountId::new("").is_err());
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        validate_identity(&value)
            .map_err(|reason| DomainError::InvalidAccount(format!("'{}' {}", value, reason)))?;
        Ok(Self(value))
    }

    /// Get the account as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a tradable settlement asset (one exchange per asset).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Create a new AssetId with validation
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        validate_identity(&value)
            .map_err(|reason| DomainError::InvalidAsset(format!("'{}' {}", value, reason)))?;
        Ok(Self(value.to_uppercase()))
    }

    /// Get the asset as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Box and Window Identifiers
// =============================================================================

/// Monotonically increasing box identifier, starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BoxId(u64);

impl BoxId {
    /// The first box ever opened by an exchange
    pub const FIRST: BoxId = BoxId(1);

    /// Wrap a raw box number
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw box number
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The id the next box will receive
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discrete time window identifier. Deadlines are expressed in windows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    /// Wrap a raw window number
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw window number
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Window derived from a unix timestamp and a window duration in seconds
    pub fn from_unix_secs(secs: u64, window_secs: u64) -> Self {
        Self(secs / window_secs.max(1))
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Price and Refund Rate
// =============================================================================

/// Clearing price: settlement-asset units per base-asset unit, scaled by 1e18.
///
/// Zero means "no trade" for a box with no flow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(#[serde(with = "crate::amount")] u128);

impl Price {
    /// Wrap a raw scaled price
    pub fn from_scaled(value: u128) -> Self {
        Self(value)
    }

    /// "No trade" marker
    pub fn zero() -> Self {
        Self(0)
    }

    /// Raw scaled value
    pub fn scaled(&self) -> u128 {
        self.0
    }

    /// True when the price marks a box without trade
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.0 / SCALE, self.0 % SCALE)
    }
}

/// Share of a category that is refunded, scaled so that the fee factor
/// (1.003e18) means "fully refunded with the trading fee restored".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RefundRate(#[serde(with = "crate::amount")] u128);

impl RefundRate {
    /// Nothing refunded
    pub const NONE: RefundRate = RefundRate(0);

    /// Wrap a raw scaled rate
    pub fn from_scaled(value: u128) -> Self {
        Self(value)
    }

    /// Raw scaled value
    pub fn scaled(&self) -> u128 {
        self.0
    }

    /// True when nothing of the category executes
    pub fn is_full(&self, fee_factor: u128) -> bool {
        self.0 >= fee_factor
    }
}

impl fmt::Display for RefundRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Direction and Category
// =============================================================================

/// Which way an order crosses the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Pays the base asset, receives the settlement asset (a buy)
    BaseToSettlement,
    /// Pays the settlement asset, receives the base asset (a sell)
    SettlementToBase,
}

impl Direction {
    /// Category an order with this direction and limit flag belongs to
    pub fn category(&self, is_limit: bool) -> OrderCategory {
        match (self, is_limit) {
            (Direction::BaseToSettlement, false) => OrderCategory::BuyNonLimit,
            (Direction::BaseToSettlement, true) => OrderCategory::BuyLimit,
            (Direction::SettlementToBase, false) => OrderCategory::SellNonLimit,
            (Direction::SettlementToBase, true) => OrderCategory::SellLimit,
        }
    }

    /// Asset the orderer pays in (and is refunded in)
    pub fn asset_in(&self) -> AssetKind {
        match self {
            Direction::BaseToSettlement => AssetKind::Base,
            Direction::SettlementToBase => AssetKind::Settlement,
        }
    }

    /// Asset the orderer receives as proceeds
    pub fn asset_out(&self) -> AssetKind {
        match self {
            Direction::BaseToSettlement => AssetKind::Settlement,
            Direction::SettlementToBase => AssetKind::Base,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::BaseToSettlement => write!(f, "BASE_TO_SETTLEMENT"),
            Direction::SettlementToBase => write!(f, "SETTLEMENT_TO_BASE"),
        }
    }
}

/// The four order categories of a box, in settlement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderCategory {
    /// Buy with no tolerance protection
    BuyNonLimit,
    /// Buy refunded when the price moves beyond tolerance
    BuyLimit,
    /// Sell with no tolerance protection
    SellNonLimit,
    /// Sell refunded when the price moves beyond tolerance
    SellLimit,
}

impl OrderCategory {
    /// All categories in the fixed settlement order
    pub const ALL: [OrderCategory; 4] = [
        OrderCategory::BuyNonLimit,
        OrderCategory::BuyLimit,
        OrderCategory::SellNonLimit,
        OrderCategory::SellLimit,
    ];

    /// Position in the settlement order (0..4)
    pub fn index(&self) -> usize {
        match self {
            OrderCategory::BuyNonLimit => 0,
            OrderCategory::BuyLimit => 1,
            OrderCategory::SellNonLimit => 2,
            OrderCategory::SellLimit => 3,
        }
    }

    /// Category settled after this one, if any
    pub fn next(&self) -> Option<OrderCategory> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Direction of the orders in this category
    pub fn direction(&self) -> Direction {
        match self {
            OrderCategory::BuyNonLimit | OrderCategory::BuyLimit => Direction::BaseToSettlement,
            OrderCategory::SellNonLimit | OrderCategory::SellLimit => Direction::SettlementToBase,
        }
    }

    /// Whether the category is tolerance-protected
    pub fn is_limit(&self) -> bool {
        matches!(self, OrderCategory::BuyLimit | OrderCategory::SellLimit)
    }
}

impl fmt::Display for OrderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderCategory::BuyNonLimit => write!(f, "BUY_NON_LIMIT"),
            OrderCategory::BuyLimit => write!(f, "BUY_LIMIT"),
            OrderCategory::SellNonLimit => write!(f, "SELL_NON_LIMIT"),
            OrderCategory::SellLimit => write!(f, "SELL_LIMIT"),
        }
    }
}

/// One of the two assets an exchange trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// The base (payable) asset
    Base,
    /// The settlement asset the exchange was created for
    Settlement,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Base => write!(f, "BASE"),
            AssetKind::Settlement => write!(f, "SETTLEMENT"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
