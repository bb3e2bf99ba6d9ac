//! Realtime error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Change feed not configured")]
    NotConfigured,

    #[error("Invalid change feed URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Subscription rejected: {0}")]
    Rejected(String),

    #[error("WebSocket error: {0}")]
    Ws(#[from] sigstream_ws::WsError),

    #[error("Core error: {0}")]
    Core(#[from] sigstream_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
