//! Row normalization.
//!
//! Turns a raw `signal_alerts` row into a [`RealtimeAlert`]. Rows come from
//! different writers (webhooks, admin tools), so numbers may be strings and
//! optional columns may be missing or blank.

use crate::error::{RealtimeError, RealtimeResult};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sigstream_core::{RealtimeAlert, SignalType, UserId};
use std::str::FromStr;

pub const DEFAULT_TIMEFRAME: &str = "unknown";
pub const DEFAULT_SOURCE: &str = "webhook";

/// Normalize a row. `received_at` fills in missing timestamps.
pub fn normalize_row(row: &Map<String, Value>, received_at: DateTime<Utc>) -> RealtimeResult<RealtimeAlert> {
    let id = text(row, "id").ok_or_else(|| missing("id"))?;
    let ticker = text(row, "ticker")
        .map(|t| t.to_ascii_uppercase())
        .ok_or_else(|| missing("ticker"))?;
    let signal_type: SignalType = text(row, "signal_type")
        .ok_or_else(|| missing("signal_type"))?
        .parse()?;
    let price = row
        .get("price")
        .and_then(decimal)
        .ok_or_else(|| RealtimeError::InvalidRow(format!("{id}: missing or invalid price")))?;
    if price.is_sign_negative() {
        return Err(RealtimeError::InvalidRow(format!("{id}: negative price {price}")));
    }

    let timestamp = row.get("timestamp").and_then(datetime);
    let created_at = row.get("created_at").and_then(datetime);

    Ok(RealtimeAlert {
        id,
        user_id: text(row, "user_id").map(UserId::new),
        ticker,
        signal_type,
        price,
        timestamp: timestamp.or(created_at).unwrap_or(received_at),
        timeframe: text(row, "timeframe").unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
        strategy: text(row, "strategy"),
        source: text(row, "source").unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        note: text(row, "note"),
        created_at: created_at.or(timestamp).unwrap_or(received_at),
    })
}

fn missing(column: &str) -> RealtimeError {
    RealtimeError::InvalidRow(format!("missing {column}"))
}

/// Non-blank string (numbers are stringified, e.g. integer ids).
fn text(row: &Map<String, Value>, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

/// RFC 3339, Postgres `timestamp` without zone (taken as UTC), or epoch
/// milliseconds.
fn datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
