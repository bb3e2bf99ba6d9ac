//! WebSocket error types.
//!
//! None of these reach `ConnectionManager` callers; network failures turn
//! into state transitions and malformed frames into a counter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer closed the socket during the handshake.
    #[error("Closed during handshake: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Frame is not a JSON object with a string `type`.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
