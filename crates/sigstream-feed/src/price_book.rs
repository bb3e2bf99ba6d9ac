//! Latest-value store for ticks and candles.
//!
//! One entry per symbol (ticks) and per symbol and interval (candles);
//! updates overwrite in place. Out-of-order updates older than the stored
//! value are ignored.

use dashmap::DashMap;
use sigstream_core::{Kline, PriceTick};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::trace;

/// Snapshot of the ticks for a set of symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub ticks: BTreeMap<String, PriceTick>,
}

impl PriceSnapshot {
    pub fn get(&self, symbol: &str) -> Option<&PriceTick> {
        self.ticks.get(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }
}

/// Aggregated price state.
#[derive(Default)]
pub struct PriceBook {
    ticks: DashMap<String, PriceTick>,
    klines: DashMap<(String, String), Kline>,
    /// Bumped on every applied update.
    version: AtomicU64,
    changed: Notify,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a tick. Returns false if it was older than the stored one.
    pub fn update_tick(&self, tick: PriceTick) -> bool {
        if let Some(current) = self.ticks.get(&tick.symbol) {
            if current.last_update > tick.last_update {
                trace!(symbol = %tick.symbol, "Ignoring out-of-order tick");
                return false;
            }
        }
        self.ticks.insert(tick.symbol.clone(), tick);
        self.bump();
        true
    }

    /// Apply a candle. Returns false if it belongs to an older interval.
    pub fn update_kline(&self, kline: Kline) -> bool {
        let key = (kline.symbol.clone(), kline.interval.clone());
        if let Some(current) = self.klines.get(&key) {
            if current.open_time > kline.open_time {
                trace!(symbol = %kline.symbol, interval = %kline.interval, "Ignoring stale kline");
                return false;
            }
        }
        self.klines.insert(key, kline);
        self.bump();
        true
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
        self.changed.notify_waiters();
    }

    pub fn tick(&self, symbol: &str) -> Option<PriceTick> {
        self.ticks.get(symbol).map(|t| t.clone())
    }

    pub fn kline(&self, symbol: &str, interval: &str) -> Option<Kline> {
        self.klines
            .get(&(symbol.to_string(), interval.to_string()))
            .map(|k| k.clone())
    }

    /// Ticks for `symbols` (all symbols when empty).
    pub fn snapshot(&self, symbols: &[String]) -> PriceSnapshot {
        let ticks = if symbols.is_empty() {
            self.ticks
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect()
        } else {
            symbols
                .iter()
                .filter_map(|s| self.tick(s).map(|t| (s.clone(), t)))
                .collect()
        };
        PriceSnapshot { ticks }
    }

    pub fn symbol_count(&self) -> usize {
        self.ticks.len()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn changed(&self) -> &Notify {
        &self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(symbol: &str, price: rust_decimal::Decimal, at: i64) -> PriceTick {
        PriceTick {
            symbol: symbol.to_string(),
            price,
            change_24h: dec!(0),
            change_percent_24h: dec!(0),
            volume_24h: dec!(0),
            last_update: at,
        }
    }

    #[test]
    fn test_tick_overwrites_in_place() {
        let book = PriceBook::new();
        assert!(book.update_tick(tick("BTCUSDT", dec!(100), 1)));
        assert!(book.update_tick(tick("BTCUSDT", dec!(101), 2)));

        assert_eq!(book.symbol_count(), 1);
        assert_eq!(book.tick("BTCUSDT").unwrap().price, dec!(101));
        assert_eq!(book.version(), 2);
    }

    #[test]
    fn test_older_tick_ignored() {
        let book = PriceBook::new();
        book.update_tick(tick("BTCUSDT", dec!(101), 5));
        assert!(!book.update_tick(tick("BTCUSDT", dec!(99), 4)));
        assert_eq!(book.tick("BTCUSDT").unwrap().price, dec!(101));
        assert_eq!(book.version(), 1);
    }

    #[test]
    fn test_snapshot_filters_symbols() {
        let book = PriceBook::new();
        book.update_tick(tick("BTCUSDT", dec!(1), 1));
        book.update_tick(tick("ETHUSDT", dec!(2), 1));

        let only_eth = book.snapshot(&["ETHUSDT".to_string(), "SOLUSDT".to_string()]);
        assert_eq!(only_eth.len(), 1);
        assert_eq!(only_eth.get("ETHUSDT").unwrap().price, dec!(2));

        assert_eq!(book.snapshot(&[]).len(), 2);
    }

    #[test]
    fn test_kline_per_interval() {
        let book = PriceBook::new();
        let candle = |interval: &str, open_time: i64, close| Kline {
            symbol: "BTCUSDT".to_string(),
            interval: interval.to_string(),
            open_time,
            open: dec!(1),
            high: dec!(2),
            low: dec!(1),
            close,
            volume: dec!(0),
            closed: false,
        };

        book.update_kline(candle("1m", 60, dec!(1.5)));
        book.update_kline(candle("1h", 0, dec!(1.2)));
        assert!(!book.update_kline(candle("1m", 0, dec!(9))));

        assert_eq!(book.kline("BTCUSDT", "1m").unwrap().close, dec!(1.5));
        assert_eq!(book.kline("BTCUSDT", "1h").unwrap().close, dec!(1.2));
    }
}
