//! Supabase Realtime channel protocol tests.
//!
//! Drives `SupabaseChangeFeed` against an in-memory server side:
//! - Join frame, acknowledgement and row delivery
//! - phx_leave on teardown
//! - Heartbeats and heartbeat timeout
//! - Rejection and connect failures

use futures_util::future::BoxFuture;
use futures_util::{sink, stream};
use serde_json::{json, Value};
use sigstream_core::UserId;
use sigstream_realtime::{
    AlertBus, AlertConfig, AlertSubscriber, ChangeEvent, ChangeFeed, ChangeKind, ChangeRequest,
    FeedHealth, RowFilter, SupabaseChangeFeed,
};
use sigstream_ws::{Connector, Socket, WsError, WsResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Server end of one in-memory socket.
struct ServerSide {
    from_client: mpsc::UnboundedReceiver<Message>,
    to_client: mpsc::UnboundedSender<Message>,
}

impl ServerSide {
    async fn next_frame(&mut self) -> Value {
        loop {
            let msg = timeout(Duration::from_secs(60), self.from_client.recv())
                .await
                .expect("client frame expected")
                .expect("client hung up");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    fn push(&self, frame: Value) {
        self.to_client
            .send(Message::Text(frame.to_string()))
            .expect("client gone");
    }
}

/// Connector whose sockets end at a `ServerSide` handed to the test.
struct InMemoryConnector {
    accepted: mpsc::UnboundedSender<ServerSide>,
    refuse: bool,
}

impl InMemoryConnector {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                accepted,
                refuse: false,
            }),
            rx,
        )
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, WsResult<Socket>> {
        if self.refuse {
            return Box::pin(async { Err(WsError::ConnectionFailed("refused".to_string())) });
        }

        let (client_tx, from_client) = mpsc::unbounded_channel::<Message>();
        let (to_client, client_rx) = mpsc::unbounded_channel::<Message>();
        let _ = self.accepted.send(ServerSide {
            from_client,
            to_client,
        });

        Box::pin(async move {
            let write = sink::unfold(client_tx, |tx, msg: Message| async move {
                tx.send(msg)
                    .map_err(|_| WsError::ConnectionFailed("server gone".to_string()))?;
                Ok::<_, WsError>(tx)
            });
            let read = stream::unfold(client_rx, |mut rx| async move {
                rx.recv().await.map(|msg| (Ok::<_, WsError>(msg), rx))
            });
            Ok(Socket::new(write, read))
        })
    }
}

fn request() -> ChangeRequest {
    ChangeRequest {
        schema: "public".to_string(),
        table: "signal_alerts".to_string(),
        filter: RowFilter::User(UserId::new("u-1")),
    }
}

fn feed(connector: Arc<InMemoryConnector>) -> SupabaseChangeFeed {
    SupabaseChangeFeed::with_connector("https://abc.supabase.co", "anon-key", connector).unwrap()
}

async fn next_event(subscription: &mut sigstream_realtime::ChangeSubscription) -> ChangeEvent {
    timeout(Duration::from_secs(60), subscription.next())
        .await
        .expect("event expected")
        .expect("feed ended")
}

#[tokio::test]
async fn test_join_ack_rows_and_leave() {
    let (connector, mut accepted) = InMemoryConnector::new();
    let feed = feed(connector);

    let mut subscription = feed.subscribe(&request());
    let mut server = accepted.recv().await.unwrap();

    let join = server.next_frame().await;
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["payload"]["access_token"], "anon-key");
    assert_eq!(
        join["payload"]["config"]["postgres_changes"][0]["filter"],
        "user_id=eq.u-1"
    );
    let topic = join["topic"].as_str().unwrap().to_string();
    assert!(topic.starts_with("realtime:"));

    server.push(json!({
        "topic": topic, "event": "phx_reply", "ref": join["ref"],
        "payload": {"status": "ok", "response": {"postgres_changes": []}}
    }));
    assert_eq!(next_event(&mut subscription).await, ChangeEvent::Subscribed);

    server.push(json!({
        "topic": topic, "event": "postgres_changes", "ref": null,
        "payload": {"data": {"type": "INSERT", "record": {"id": "a-1", "ticker": "BTCUSDT"}}}
    }));
    match next_event(&mut subscription).await {
        ChangeEvent::Row { kind, record } => {
            assert_eq!(kind, ChangeKind::Insert);
            assert_eq!(record["id"], "a-1");
        }
        other => panic!("expected row, got {other:?}"),
    }

    drop(subscription);
    let leave = server.next_frame().await;
    assert_eq!(leave["event"], "phx_leave");
    assert_eq!(leave["topic"], topic);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sent_and_timeout_fails() {
    let (connector, mut accepted) = InMemoryConnector::new();
    let feed = feed(connector).with_heartbeat(Duration::from_secs(25));

    let mut subscription = feed.subscribe(&request());
    let mut server = accepted.recv().await.unwrap();
    let _join = server.next_frame().await;

    let first = server.next_frame().await;
    assert_eq!(first["topic"], "phoenix");
    assert_eq!(first["event"], "heartbeat");
    server.push(json!({
        "topic": "phoenix", "event": "phx_reply", "ref": first["ref"],
        "payload": {"status": "ok", "response": {}}
    }));

    // Second heartbeat goes unanswered.
    let second = server.next_frame().await;
    assert_eq!(second["event"], "heartbeat");
    assert_ne!(second["ref"], first["ref"]);

    assert_eq!(
        next_event(&mut subscription).await,
        ChangeEvent::Failed("heartbeat timeout".to_string())
    );
}

#[tokio::test]
async fn test_rejected_join_and_server_close() {
    let (connector, mut accepted) = InMemoryConnector::new();
    let feed = feed(connector);

    let mut rejected = feed.subscribe(&request());
    let mut server = accepted.recv().await.unwrap();
    let join = server.next_frame().await;
    server.push(json!({
        "topic": join["topic"], "event": "phx_reply", "ref": join["ref"],
        "payload": {"status": "error", "response": {"reason": "Unauthorized"}}
    }));
    assert_eq!(
        next_event(&mut rejected).await,
        ChangeEvent::Failed("join rejected: Unauthorized".to_string())
    );

    let mut dropped = feed.subscribe(&request());
    let ServerSide {
        from_client: _still_reading,
        to_client,
    } = accepted.recv().await.unwrap();
    drop(to_client);
    assert_eq!(
        next_event(&mut dropped).await,
        ChangeEvent::Failed("socket closed".to_string())
    );
}

#[tokio::test]
async fn test_subscriber_reports_connect_failure() {
    let (accepted, _rx) = mpsc::unbounded_channel();
    let connector = Arc::new(InMemoryConnector {
        accepted,
        refuse: true,
    });
    let feed = feed(connector);
    let subscriber = AlertSubscriber::new(
        Some(Arc::new(feed) as Arc<dyn ChangeFeed>),
        &AlertConfig::default(),
        AlertBus::default(),
    );

    let mut health = subscriber.health_changes();
    subscriber.set_identity(None);

    let reached = timeout(Duration::from_secs(2), async {
        loop {
            if let FeedHealth::Error(reason) = health.borrow_and_update().clone() {
                return reason;
            }
            health.changed().await.unwrap();
        }
    })
    .await
    .expect("health should turn to error");
    assert!(reached.starts_with("connect failed"));
}
