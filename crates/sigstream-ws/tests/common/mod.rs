//! Mock WebSocket server for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Accept connections on any path
//! - Record received text frames and close codes
//! - Push text frames or close frames to every live connection

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Command pushed to every connected client.
#[derive(Debug, Clone)]
pub enum ServerCommand {
    Text(String),
    Close(u16),
}

#[derive(Default)]
struct Recorded {
    connections: u32,
    messages: Vec<String>,
    client_close_codes: Vec<u16>,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<ServerCommand>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let (commands, _) = broadcast::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let recorded_clone = recorded.clone();
        let commands_clone = commands.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            recorded_clone.clone(),
                            commands_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            recorded,
        }
    }

    /// Page origin whose derived endpoint points at this server.
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the number of completed handshakes.
    pub async fn connection_count(&self) -> u32 {
        self.recorded.lock().await.connections
    }

    /// Get all received text frames.
    pub async fn received_messages(&self) -> Vec<String> {
        self.recorded.lock().await.messages.clone()
    }

    /// Close codes sent by clients.
    pub async fn client_close_codes(&self) -> Vec<u16> {
        self.recorded.lock().await.client_close_codes.clone()
    }

    /// Send a text frame to every connection.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Text(text.into()));
    }

    /// Close every connection with `code`.
    pub fn close_all(&self, code: u16) {
        let _ = self.commands.send(ServerCommand::Close(code));
    }

    /// Poll until `count` handshakes completed.
    pub async fn wait_for_connections(&self, count: u32, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.connection_count().await < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Poll until at least `count` text frames were received.
    pub async fn wait_for_messages(&self, count: usize, within: Duration) -> Vec<String> {
        let _ = tokio::time::timeout(within, async {
            while self.received_messages().await.len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        self.received_messages().await
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    recorded: Arc<Mutex<Recorded>>,
    mut commands: broadcast::Receiver<ServerCommand>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    recorded.lock().await.connections += 1;

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        recorded.lock().await.messages.push(text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            recorded.lock().await.client_close_codes.push(frame.code.into());
                        }
                        break;
                    }
                    Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Ok(ServerCommand::Text(text)) => {
                        let _ = write.send(Message::Text(text)).await;
                    }
                    Ok(ServerCommand::Close(code)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "server close".into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
