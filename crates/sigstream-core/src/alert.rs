//! Trading alert types.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authenticated user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a trading alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = CoreError;

    /// Case-insensitive; `long`/`short` are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(Self::Buy),
            "sell" | "short" => Ok(Self::Sell),
            _ => Err(CoreError::InvalidSignalType(s.to_string())),
        }
    }
}

/// Normalized alert delivered by the realtime change feed.
///
/// Alerts are immutable once created; an update from the source row
/// replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeAlert {
    pub id: String,
    /// Owner, or `None` for system-wide alerts.
    pub user_id: Option<UserId>,
    pub ticker: String,
    pub signal_type: SignalType,
    pub price: Decimal,
    /// Signal time reported by the source.
    pub timestamp: DateTime<Utc>,
    /// Chart timeframe (e.g., "15m", "4h").
    pub timeframe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Origin of the alert (e.g., "webhook", "tradingview").
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl RealtimeAlert {
    /// Whether the alert is visible to everyone.
    pub fn is_system_wide(&self) -> bool {
        self.user_id.is_none()
    }
}
