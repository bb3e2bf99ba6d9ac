//! Supabase Realtime change feed.
//!
//! One socket per subscription. The channel joins with a `postgres_changes`
//! config, sends a heartbeat every 25 s, and leaves on teardown. Any
//! rejection, server-side close or socket loss ends the subscription with
//! `ChangeEvent::Failed`; reconnecting is left to the caller.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeRequest, ChangeSender, ChangeSubscription};
use crate::error::{RealtimeError, RealtimeResult};
use crate::phoenix::{
    PhoenixMessage, PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR, POSTGRES_CHANGES, SYSTEM,
};
use futures_util::{SinkExt, StreamExt};
use sigstream_ws::{derive_endpoint, Connector, Socket, SocketSink, TungsteniteConnector};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

pub const REALTIME_PATH: &str = "/realtime/v1/websocket";
pub const PROTOCOL_VSN: &str = "1.0.0";
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Socket URL for a project URL and anon key.
pub fn realtime_url(supabase_url: &str, anon_key: &str) -> RealtimeResult<String> {
    let base = derive_endpoint(supabase_url, REALTIME_PATH)
        .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
    Ok(format!("{base}?apikey={anon_key}&vsn={PROTOCOL_VSN}"))
}

pub struct SupabaseChangeFeed {
    /// Contains the key; never logged.
    url: String,
    access_token: String,
    connector: Arc<dyn Connector>,
    heartbeat: Duration,
    channels: AtomicU64,
}

impl SupabaseChangeFeed {
    pub fn new(supabase_url: &str, anon_key: &str) -> RealtimeResult<Self> {
        Self::with_connector(supabase_url, anon_key, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(
        supabase_url: &str,
        anon_key: &str,
        connector: Arc<dyn Connector>,
    ) -> RealtimeResult<Self> {
        Ok(Self {
            url: realtime_url(supabase_url, anon_key)?,
            access_token: anon_key.to_string(),
            connector,
            heartbeat: HEARTBEAT_INTERVAL,
            channels: AtomicU64::new(0),
        })
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = interval;
        self
    }
}

impl ChangeFeed for SupabaseChangeFeed {
    fn subscribe(&self, request: &ChangeRequest) -> ChangeSubscription {
        let (sender, subscription) = ChangeSubscription::channel();
        let n = self.channels.fetch_add(1, Ordering::Relaxed);
        let topic = format!("realtime:{}-{n}", request.table);

        let session = ChannelSession::new(topic);
        let join = PhoenixMessage::join(
            &session.topic,
            request,
            &self.access_token,
            session.join_ref.clone(),
        );

        tokio::spawn(run_channel(
            self.connector.clone(),
            self.url.clone(),
            join,
            session,
            self.heartbeat,
            sender,
        ));
        subscription
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Protocol state of one joined channel.
#[derive(Debug)]
struct ChannelSession {
    topic: String,
    join_ref: String,
    next_ref: u64,
    pending_heartbeat: Option<String>,
    joined: bool,
}

impl ChannelSession {
    fn new(topic: String) -> Self {
        Self {
            topic,
            join_ref: "1".to_string(),
            next_ref: 2,
            pending_heartbeat: None,
            joined: false,
        }
    }

    fn next_ref(&mut self) -> String {
        let reference = self.next_ref.to_string();
        self.next_ref += 1;
        reference
    }

    fn handle(&mut self, msg: PhoenixMessage, sender: &ChangeSender) -> Flow {
        if msg.topic == PHOENIX_TOPIC {
            if let Some(pending) = self.pending_heartbeat.as_deref() {
                if msg.is_reply_to(pending) {
                    self.pending_heartbeat = None;
                }
            }
            return Flow::Continue;
        }
        if msg.topic != self.topic {
            trace!(topic = %msg.topic, "Frame for another topic");
            return Flow::Continue;
        }

        let event = if msg.is_reply_to(&self.join_ref) {
            if msg.status() == Some("ok") {
                self.joined = true;
                info!(topic = %self.topic, "Realtime channel joined");
                ChangeEvent::Subscribed
            } else {
                ChangeEvent::Failed(format!("join rejected: {}", msg.reason()))
            }
        } else {
            match msg.event.as_str() {
                POSTGRES_CHANGES => match msg.row_change() {
                    Some((kind, record)) => ChangeEvent::Row { kind, record },
                    None => {
                        debug!(topic = %self.topic, "Ignoring change without record");
                        return Flow::Continue;
                    }
                },
                SYSTEM if msg.status().is_some_and(|s| s != "ok") => {
                    ChangeEvent::Failed(msg.reason())
                }
                PHX_ERROR => ChangeEvent::Failed("channel error".to_string()),
                PHX_CLOSE => ChangeEvent::Failed("channel closed by server".to_string()),
                _ => return Flow::Continue,
            }
        };

        let terminal = matches!(event, ChangeEvent::Failed(_));
        if !sender.send(event) || terminal {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

async fn send_frame(sink: &mut SocketSink, msg: &PhoenixMessage) -> RealtimeResult<()> {
    sink.send(Message::Text(msg.to_text()?)).await?;
    Ok(())
}

fn fail(sender: &ChangeSender, topic: &str, reason: String) {
    warn!(topic, %reason, "Realtime channel failed");
    sender.send(ChangeEvent::Failed(reason));
}

async fn run_channel(
    connector: Arc<dyn Connector>,
    url: String,
    join: PhoenixMessage,
    mut session: ChannelSession,
    heartbeat: Duration,
    sender: ChangeSender,
) {
    let connected = tokio::select! {
        result = connector.connect(&url) => result,
        () = sender.cancelled() => return,
    };
    let Socket {
        mut sink,
        mut stream,
    } = match connected {
        Ok(socket) => socket,
        Err(e) => {
            fail(&sender, &session.topic, format!("connect failed: {e}"));
            return;
        }
    };

    if let Err(e) = send_frame(&mut sink, &join).await {
        fail(&sender, &session.topic, format!("join failed: {e}"));
        return;
    }
    debug!(topic = %session.topic, "Realtime join sent");

    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = sender.cancelled() => {
                let reference = session.next_ref();
                let leave = PhoenixMessage::leave(&session.topic, reference);
                if let Err(e) = send_frame(&mut sink, &leave).await {
                    debug!(error = %e, "Failed to send phx_leave");
                }
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "unsubscribe".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                debug!(topic = %session.topic, joined = session.joined, "Realtime channel left");
                return;
            }

            _ = ticker.tick() => {
                if session.pending_heartbeat.is_some() {
                    fail(&sender, &session.topic, "heartbeat timeout".to_string());
                    return;
                }
                let reference = session.next_ref();
                if let Err(e) = send_frame(&mut sink, &PhoenixMessage::heartbeat(reference.clone())).await {
                    fail(&sender, &session.topic, format!("heartbeat failed: {e}"));
                    return;
                }
                session.pending_heartbeat = Some(reference);
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match PhoenixMessage::parse(&text) {
                        Ok(msg) => {
                            if session.handle(msg, &sender) == Flow::Stop {
                                let _ = sink.close().await;
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed realtime frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        fail(&sender, &session.topic, "socket closed".to_string());
                        return;
                    }
                    Some(Err(e)) => {
                        fail(&sender, &session.topic, format!("socket error: {e}"));
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
