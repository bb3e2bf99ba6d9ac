//! Socket transport seam.
//!
//! The connection manager opens sockets through a [`Connector`] so tests can
//! replace the network with scripted sockets.

use crate::error::{WsError, WsResult};
use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_tungstenite::tungstenite::Message;

/// Write half of an open socket.
pub type SocketSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of an open socket.
pub type SocketStream = Pin<Box<dyn Stream<Item = WsResult<Message>> + Send>>;

/// An open socket, already split.
pub struct Socket {
    pub sink: SocketSink,
    pub stream: SocketStream,
}

impl Socket {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Message, Error = WsError> + Send + 'static,
        R: Stream<Item = WsResult<Message>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens sockets to a URL.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket. Resolves once the handshake completed.
    fn connect(&self, url: &str) -> BoxFuture<'static, WsResult<Socket>>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, WsResult<Socket>> {
        let url = url.to_string();
        Box::pin(async move {
            // TCP_NODELAY: ticks are small and latency sensitive
            let (ws_stream, _response) =
                connect_async_tls_with_config(url.as_str(), None, true, None).await?;
            let (write, read) = ws_stream.split();
            Ok(Socket::new(
                write.sink_map_err(WsError::from),
                read.map(|frame| frame.map_err(WsError::from)),
            ))
        })
    }
}
