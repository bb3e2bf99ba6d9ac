//! Streamed market data types.
//!
//! Ticks and candles are ephemeral: the latest value per symbol (or per
//! symbol and interval) replaces the previous one and nothing is persisted.

use crate::alert::SignalType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest 24h ticker state for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    /// Symbol (e.g., "BTCUSDT").
    pub symbol: String,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute price change over 24h.
    #[serde(rename = "change24h")]
    pub change_24h: Decimal,
    /// Percent price change over 24h.
    #[serde(rename = "changePercent24h")]
    pub change_percent_24h: Decimal,
    /// Quote volume over 24h.
    #[serde(rename = "volume24h")]
    pub volume_24h: Decimal,
    /// Last update time (epoch milliseconds).
    pub last_update: i64,
}

impl PriceTick {
    /// Price 24h ago, derived from the current price and the absolute change.
    pub fn open_24h(&self) -> Decimal {
        self.price - self.change_24h
    }

    /// Whether the symbol is up over the 24h window.
    pub fn is_up(&self) -> bool {
        self.change_24h.is_sign_positive() && !self.change_24h.is_zero()
    }
}

/// One OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kline {
    pub symbol: String,
    /// Candle interval (e.g., "1m", "1h").
    pub interval: String,
    /// Candle open time (epoch milliseconds).
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Whether the candle is final.
    #[serde(default)]
    pub closed: bool,
}

impl Kline {
    /// Percent move from open to close.
    pub fn change_percent(&self) -> Option<Decimal> {
        percent_change(self.open, self.close)
    }
}

/// Percent change from `from` to `to`.
///
/// Returns `None` when `from` is zero.
pub fn percent_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    if from.is_zero() {
        return None;
    }
    Some((to - from) / from * Decimal::ONE_HUNDRED)
}

/// Realized P&L for a position opened on `side` at `entry` and closed at `exit`.
pub fn position_pnl(side: SignalType, entry: Decimal, exit: Decimal, quantity: Decimal) -> Decimal {
    match side {
        SignalType::Buy => (exit - entry) * quantity,
        SignalType::Sell => (entry - exit) * quantity,
    }
}
