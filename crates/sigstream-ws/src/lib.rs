//! Reconnecting WebSocket client for sigstream.
//!
//! Provides one best-effort socket to the product backend with:
//! - Endpoint derivation from the serving page origin
//! - Bounded exponential-backoff reconnection (close code 1000 never reconnects)
//! - Ordered, failure-isolated fan-out of tagged JSON messages to handlers
//! - A `Connector` seam so tests can script the transport

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod message;
pub mod transport;

pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
    NO_STATUS_RECEIVED,
};
pub use endpoint::{derive_endpoint, DEFAULT_WS_PATH};
pub use error::{WsError, WsResult};
pub use handlers::{HandlerError, HandlerId, HandlerRegistry, HandlerResult};
pub use message::WsMessage;
pub use transport::{Connector, Socket, SocketSink, SocketStream, TungsteniteConnector};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the ring provider as the process-wide rustls default.
/// `wss://` handshakes go through rustls and fail without a default provider,
/// so call this before the first connection. Repeat calls are no-ops.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
