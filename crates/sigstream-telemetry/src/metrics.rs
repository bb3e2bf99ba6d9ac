//! Prometheus metrics for sigstream.
//!
//! Covers:
//! - Connection state, reconnects and malformed frames
//! - Price updates applied and rejected
//! - Alert rows, alert feed health and retained alerts
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, a fatal configuration error that should crash at first use rather
//! than fail silently. These panics only occur during static
//! initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

/// Connection states exported on `sigstream_ws_state`.
pub const CONNECTION_STATES: [&str; 4] = ["idle", "connecting", "open", "closed"];

/// Alert feed health values exported on `sigstream_alert_feed_health`.
pub const FEED_HEALTH_STATES: [&str; 4] = ["pending", "connected", "error", "not_configured"];

/// WebSocket open (1) or not (0).
pub static WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sigstream_ws_connected", "WebSocket connection open (1=open)").unwrap()
});

/// Current connection state, one-hot.
pub static WS_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "sigstream_ws_state",
        "WebSocket connection state (1=active)",
        &["state"]
    )
    .unwrap()
});

pub static WS_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigstream_ws_reconnect_total",
        "Total WebSocket reconnection attempts"
    )
    .unwrap()
});

pub static WS_MALFORMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigstream_ws_malformed_messages_total",
        "Inbound frames dropped as malformed"
    )
    .unwrap()
});

/// Labels: kind (tick/kline/rejected)
pub static PRICE_UPDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sigstream_price_updates_total",
        "Price feed messages applied or rejected",
        &["kind"]
    )
    .unwrap()
});

/// Labels: kind (insert/update/rejected)
pub static ALERT_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sigstream_alert_events_total",
        "Alert rows received from the change feed",
        &["kind"]
    )
    .unwrap()
});

/// Alert feed health, one-hot.
pub static ALERT_FEED_HEALTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "sigstream_alert_feed_health",
        "Alert subscription health (1=active)",
        &["health"]
    )
    .unwrap()
});

pub static ALERTS_RETAINED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sigstream_alerts_retained", "Alerts currently retained").unwrap()
});

fn set_one_hot(gauge: &IntGaugeVec, labels: &[&str], active: &str) {
    for label in labels {
        gauge.with_label_values(&[label]).set(0);
    }
    gauge.with_label_values(&[active]).set(1);
}

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the connection state (one of `CONNECTION_STATES`).
    pub fn connection_state(state: &str) {
        set_one_hot(&WS_STATE, &CONNECTION_STATES, state);
        WS_CONNECTED.set(i64::from(state == "open"));
    }

    pub fn reconnect_attempts(count: u64) {
        WS_RECONNECT_TOTAL.inc_by(count);
    }

    pub fn malformed_messages(count: u64) {
        WS_MALFORMED_TOTAL.inc_by(count);
    }

    pub fn price_updates(kind: &str, count: u64) {
        PRICE_UPDATES_TOTAL.with_label_values(&[kind]).inc_by(count);
    }

    pub fn alert_events(kind: &str, count: u64) {
        ALERT_EVENTS_TOTAL.with_label_values(&[kind]).inc_by(count);
    }

    /// Set the alert feed health (one of `FEED_HEALTH_STATES`).
    pub fn alert_feed_health(health: &str) {
        set_one_hot(&ALERT_FEED_HEALTH, &FEED_HEALTH_STATES, health);
    }

    pub fn alerts_retained(count: usize) {
        ALERTS_RETAINED.set(count as i64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
