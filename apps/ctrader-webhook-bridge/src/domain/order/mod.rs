//! Order Types
//!
//! Broker-agnostic representation of the market orders this bridge places
//! and of the acknowledgements that come back for them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker volume units per unit of webhook volume.
///
/// cTrader expresses volume in hundredths, so a webhook volume of `0.01`
/// becomes one broker unit.
pub const VOLUME_UNITS_PER_LOT: Decimal = Decimal::ONE_HUNDRED;

/// Error code for an order refused locally because its volume rounds to zero
/// broker units.
pub const BAD_VOLUME_CODE: &str = "TRADING_BAD_VOLUME";

// =============================================================================
// Request Identifiers
// =============================================================================

/// Correlation id for one submitted order.
///
/// Generated by the submitter and echoed back by the broker as `clientMsgId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Order Request
// =============================================================================

/// Side of a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    /// Buy at market.
    Buy,
    /// Sell at market.
    Sell,
}

impl TradeSide {
    /// Parse a side, accepting `BUY`/`SELL` in any letter case and nothing else.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("BUY") {
            Some(Self::Buy)
        } else if value.eq_ignore_ascii_case("SELL") {
            Some(Self::Sell)
        } else {
            None
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type. Only market orders are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Execute immediately at the current price.
    #[default]
    Market,
}

/// A validated market order ready to be sent to the broker.
///
/// Construct through [`crate::domain::translator::translate`] or
/// [`OrderRequest::new`]; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    symbol_id: i64,
    side: TradeSide,
    volume: Decimal,
}

impl OrderRequest {
    /// Create an order request.
    ///
    /// Returns `None` unless `symbol_id > 0`, `volume > 0` and the volume
    /// fits in `i64` broker units.
    #[must_use]
    pub fn new(symbol_id: i64, side: TradeSide, volume: Decimal) -> Option<Self> {
        if symbol_id <= 0 || volume <= Decimal::ZERO {
            return None;
        }
        rounded_units(volume)?;
        Some(Self {
            symbol_id,
            side,
            volume,
        })
    }

    /// Broker symbol id.
    #[must_use]
    pub const fn symbol_id(&self) -> i64 {
        self.symbol_id
    }

    /// Order side.
    #[must_use]
    pub const fn side(&self) -> TradeSide {
        self.side
    }

    /// Volume as received in the webhook (lots).
    #[must_use]
    pub const fn volume(&self) -> Decimal {
        self.volume
    }

    /// Order type, always market.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        OrderType::Market
    }

    /// Volume in broker units (`volume * 100`, half away from zero).
    ///
    /// Returns `None` when the volume rounds to zero units or overflows `i64`.
    #[must_use]
    pub fn volume_units(&self) -> Option<i64> {
        rounded_units(self.volume).filter(|units| *units > 0)
    }
}

fn rounded_units(volume: Decimal) -> Option<i64> {
    volume
        .checked_mul(VOLUME_UNITS_PER_LOT)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

// =============================================================================
// Acknowledgements and Rejections
// =============================================================================

/// Execution status reported by the broker when acknowledging an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Order accepted by the broker.
    Accepted,
    /// Order completely filled.
    Filled,
    /// Order partially filled.
    PartiallyFilled,
    /// Order replaced.
    Replaced,
    /// Order cancelled.
    Cancelled,
    /// Order expired.
    Expired,
}

impl ExecutionStatus {
    /// Snake-case name as used in HTTP responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Filled => "filled",
            Self::PartiallyFilled => "partially_filled",
            Self::Replaced => "replaced",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// Positive broker answer to a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    /// Correlation id of the submission.
    pub request_id: RequestId,
    /// Broker-assigned order id.
    pub order_id: i64,
    /// Execution status carried by the acknowledgement.
    pub execution_status: ExecutionStatus,
    /// When the acknowledgement was received.
    pub acknowledged_at: DateTime<Utc>,
}

impl OrderAck {
    /// Build an acknowledgement stamped with the current time.
    #[must_use]
    pub fn new(request_id: RequestId, order_id: i64, execution_status: ExecutionStatus) -> Self {
        Self {
            request_id,
            order_id,
            execution_status,
            acknowledged_at: Utc::now(),
        }
    }
}

/// Business-level refusal reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {description}")]
pub struct BrokerRejection {
    /// Broker error code, e.g. `NOT_ENOUGH_MONEY`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}

impl BrokerRejection {
    /// Create a rejection.
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Refusal for an order below one broker unit.
    #[must_use]
    pub fn bad_volume() -> Self {
        Self::new(BAD_VOLUME_CODE, "volume rounds to zero broker units")
    }
}
