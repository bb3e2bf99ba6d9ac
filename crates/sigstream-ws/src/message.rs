//! WebSocket message types.
//!
//! Every frame in either direction is a JSON object with a `type`
//! discriminant. The remaining fields are open-ended and owned by whichever
//! consumer matches on the type.

use crate::error::{WsError, WsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tagged message `{ "type": ..., ...payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// Discriminant consumers pattern-match on.
    #[serde(rename = "type")]
    pub kind: String,
    /// All other top-level fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl WsMessage {
    /// Create a message with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Builder-style payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Parse an inbound text frame.
    ///
    /// Fails for invalid JSON, non-object values and objects without a
    /// string `type` field.
    pub fn parse(text: &str) -> WsResult<Self> {
        serde_json::from_str(text).map_err(|e| WsError::MalformedMessage(e.to_string()))
    }

    /// Check the discriminant.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Get a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Deserialize the payload (without `type`) into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> WsResult<T> {
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
