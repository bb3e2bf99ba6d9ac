//! Core domain types for the sigstream realtime client.
//!
//! This crate provides the types shared by every data path:
//! - `PriceTick`, `Kline`: streamed market data, overwritten in place
//! - `RealtimeAlert`, `SignalType`: trading alerts from the change feed
//! - `UserId`: identity used to scope alert subscriptions
//! - P&L and percent-change arithmetic used by chart consumers

pub mod alert;
pub mod error;
pub mod price;

pub use alert::{RealtimeAlert, SignalType, UserId};
pub use error::{CoreError, Result};
pub use price::{percent_change, position_pnl, Kline, PriceTick};
