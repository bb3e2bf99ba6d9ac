//! Message parsing for streamed market data.
//!
//! Parses tagged socket messages into typed ticks and candles. Numeric
//! fields may arrive as JSON numbers or numeric strings.

use crate::error::{FeedError, FeedResult};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use sigstream_core::{Kline, PriceTick};
use sigstream_ws::WsMessage;

/// Message types carrying a 24h ticker.
pub const PRICE_TYPES: [&str; 2] = ["price", "ticker"];
/// Message type carrying a candle.
pub const KLINE_TYPE: &str = "kline";

/// Parsed market data event.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Price(PriceTick),
    Kline(Kline),
}

/// Raw ticker payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    symbol: String,
    price: Decimal,
    #[serde(default, rename = "change24h")]
    change_24h: Decimal,
    #[serde(default, rename = "changePercent24h")]
    change_percent_24h: Decimal,
    #[serde(default, rename = "volume24h")]
    volume_24h: Decimal,
    #[serde(default, alias = "timestamp")]
    last_update: Option<i64>,
}

/// Raw candle payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKline {
    symbol: String,
    interval: String,
    open_time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: Decimal,
    #[serde(default, alias = "isClosed")]
    closed: bool,
}

/// Parse a socket message into a feed event.
///
/// Returns `Ok(None)` for message types this feed does not consume.
pub fn parse_feed_message(msg: &WsMessage) -> FeedResult<Option<FeedEvent>> {
    if PRICE_TYPES.contains(&msg.kind.as_str()) {
        let raw: RawPrice = msg
            .payload_as()
            .map_err(|e| FeedError::ParseError(format!("{}: {e}", msg.kind)))?;
        return price_from_raw(raw).map(|t| Some(FeedEvent::Price(t)));
    }

    if msg.kind == KLINE_TYPE {
        let raw: RawKline = msg
            .payload_as()
            .map_err(|e| FeedError::ParseError(format!("kline: {e}")))?;
        return kline_from_raw(raw).map(|k| Some(FeedEvent::Kline(k)));
    }

    Ok(None)
}

/// Symbols are compared case-insensitively; store them upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

fn price_from_raw(raw: RawPrice) -> FeedResult<PriceTick> {
    let symbol = normalize_symbol(&raw.symbol);
    if symbol.is_empty() {
        return Err(FeedError::InvalidData("empty symbol".to_string()));
    }
    if raw.price.is_sign_negative() {
        return Err(FeedError::InvalidData(format!(
            "{symbol}: negative price {}",
            raw.price
        )));
    }

    Ok(PriceTick {
        symbol,
        price: raw.price,
        change_24h: raw.change_24h,
        change_percent_24h: raw.change_percent_24h,
        volume_24h: raw.volume_24h,
        last_update: raw
            .last_update
            .unwrap_or_else(|| Utc::now().timestamp_millis()),
    })
}

fn kline_from_raw(raw: RawKline) -> FeedResult<Kline> {
    let symbol = normalize_symbol(&raw.symbol);
    if symbol.is_empty() || raw.interval.is_empty() {
        return Err(FeedError::InvalidData(
            "kline without symbol or interval".to_string(),
        ));
    }
    if raw.low > raw.high {
        return Err(FeedError::InvalidData(format!(
            "{symbol}: low {} above high {}",
            raw.low, raw.high
        )));
    }

    Ok(Kline {
        symbol,
        interval: raw.interval,
        open_time: raw.open_time,
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        volume: raw.volume,
        closed: raw.closed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn msg(text: &str) -> WsMessage {
        WsMessage::parse(text).unwrap()
    }

    #[test]
    fn test_parse_price_with_string_and_number_fields() {
        let event = parse_feed_message(&msg(
            r#"{"type":"price","symbol":"btcusdt","price":"64000.5","change24h":-120,
                "changePercent24h":"-0.19","volume24h":1000,"timestamp":1700000000000}"#,
        ))
        .unwrap();

        match event {
            Some(FeedEvent::Price(tick)) => {
                assert_eq!(tick.symbol, "BTCUSDT");
                assert_eq!(tick.price, dec!(64000.5));
                assert_eq!(tick.change_24h, dec!(-120));
                assert_eq!(tick.last_update, 1_700_000_000_000);
            }
            other => panic!("expected price, got {other:?}"),
        }
    }

    #[test]
    fn test_ticker_alias_and_defaults() {
        let event = parse_feed_message(&msg(r#"{"type":"ticker","symbol":"ETHUSDT","price":3000}"#))
            .unwrap()
            .unwrap();
        let FeedEvent::Price(tick) = event else {
            panic!("expected price");
        };
        assert_eq!(tick.change_percent_24h, Decimal::ZERO);
        assert!(tick.last_update > 0);
    }

    #[test]
    fn test_parse_kline() {
        let event = parse_feed_message(&msg(
            r#"{"type":"kline","symbol":"BTCUSDT","interval":"1m","openTime":1700000000000,
                "open":"100","high":"110","low":"95","close":"105","volume":"12","closed":true}"#,
        ))
        .unwrap()
        .unwrap();
        let FeedEvent::Kline(kline) = event else {
            panic!("expected kline");
        };
        assert_eq!(kline.change_percent(), Some(dec!(5)));
        assert!(kline.closed);
    }

    #[test]
    fn test_unrelated_and_invalid_messages() {
        assert_eq!(parse_feed_message(&msg(r#"{"type":"alert"}"#)).unwrap(), None);
        assert!(parse_feed_message(&msg(r#"{"type":"price","symbol":"BTC"}"#)).is_err());
        assert!(parse_feed_message(&msg(r#"{"type":"price","symbol":" ","price":1}"#)).is_err());
        assert!(parse_feed_message(&msg(
            r#"{"type":"kline","symbol":"BTC","interval":"1m","openTime":1,"open":1,"high":1,"low":2,"close":1}"#
        ))
        .is_err());
    }
}
