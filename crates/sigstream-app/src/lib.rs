//! Headless sigstream client.
//!
//! Wires the shared connection, the price stream and the realtime alert
//! subscriber together, logs what they deliver and keeps the Prometheus
//! metrics current.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
