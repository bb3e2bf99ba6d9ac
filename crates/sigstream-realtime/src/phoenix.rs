//! Phoenix channel frames as spoken by Supabase Realtime.
//!
//! Every frame is `{ topic, event, payload, ref, join_ref? }`. Server pushes
//! carry `ref: null`.

use crate::change_feed::{ChangeKind, ChangeRequest};
use crate::error::RealtimeResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Topic used for socket-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value, reference: Option<String>) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference,
            join_ref: None,
        }
    }

    /// Join a channel listening for INSERT and UPDATE on one table.
    pub fn join(topic: &str, request: &ChangeRequest, access_token: &str, reference: String) -> Self {
        let filter = request.filter.to_string();
        let changes: Vec<Value> = [ChangeKind::Insert, ChangeKind::Update]
            .iter()
            .map(|kind| {
                json!({
                    "event": kind.as_str(),
                    "schema": request.schema,
                    "table": request.table,
                    "filter": filter,
                })
            })
            .collect();

        let payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
                "private": false,
            },
            "access_token": access_token,
        });

        let mut msg = Self::new(topic, PHX_JOIN, payload, Some(reference.clone()));
        msg.join_ref = Some(reference);
        msg
    }

    pub fn leave(topic: &str, reference: String) -> Self {
        Self::new(topic, PHX_LEAVE, json!({}), Some(reference))
    }

    pub fn heartbeat(reference: String) -> Self {
        Self::new(PHOENIX_TOPIC, HEARTBEAT, json!({}), Some(reference))
    }

    pub fn parse(text: &str) -> RealtimeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_reply_to(&self, reference: &str) -> bool {
        self.event == PHX_REPLY && self.reference.as_deref() == Some(reference)
    }

    /// `payload.status` of replies and system events.
    pub fn status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Human-readable reason carried by an error reply or system event.
    pub fn reason(&self) -> String {
        let payload = &self.payload;
        payload
            .pointer("/response/reason")
            .or_else(|| payload.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| payload.get("response").map(Value::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Row change carried by a `postgres_changes` push.
    pub fn row_change(&self) -> Option<(ChangeKind, Map<String, Value>)> {
        let data = self.payload.get("data")?;
        let kind = match data.get("type")?.as_str()? {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            _ => return None,
        };
        let record = data.get("record")?.as_object()?.clone();
        Some((kind, record))
    }
}
