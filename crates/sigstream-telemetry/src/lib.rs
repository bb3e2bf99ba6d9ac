//! Prometheus metrics and structured logging for sigstream.
//!
//! - `init_logging` sets up `tracing` (pretty in development, JSON when
//!   `RUST_ENV=production`)
//! - `Metrics` records connection, price and alert activity and renders the
//!   Prometheus text exposition

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_LOG_FILTER};
pub use metrics::Metrics;
