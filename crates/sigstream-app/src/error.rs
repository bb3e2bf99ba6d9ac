//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] sigstream_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] sigstream_feed::FeedError),

    #[error("Realtime error: {0}")]
    Realtime(#[from] sigstream_realtime::RealtimeError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigstream_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
