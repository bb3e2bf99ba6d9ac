//! Change-feed seam.
//!
//! A [`ChangeFeed`] opens one filtered subscription to a table and streams
//! [`ChangeEvent`]s back. Dropping the returned [`ChangeSubscription`]
//! tears the subscription down.

use serde_json::{Map, Value};
use sigstream_core::UserId;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Row filter on the `user_id` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Rows owned by one user.
    User(UserId),
    /// System-wide rows (`user_id` is null).
    SystemWide,
}

impl RowFilter {
    pub fn for_identity(identity: Option<&UserId>) -> Self {
        match identity {
            Some(id) => Self::User(id.clone()),
            None => Self::SystemWide,
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user_id=eq.{id}"),
            Self::SystemWide => f.write_str("user_id=is.null"),
        }
    }
}

/// What to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    pub schema: String,
    pub table: String,
    pub filter: RowFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
        }
    }
}

/// Event delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The server acknowledged the subscription.
    Subscribed,
    /// A row was inserted or updated.
    Row {
        kind: ChangeKind,
        record: Map<String, Value>,
    },
    /// The subscription failed; no further events follow.
    Failed(String),
}

/// Live subscription handle. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ChangeSubscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl ChangeSubscription {
    /// Create a subscription and the sender its producer writes to.
    pub fn channel() -> (ChangeSender, Self) {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            ChangeSender {
                tx,
                cancel: cancel.clone(),
            },
            Self { events, cancel },
        )
    }

    /// Next event; `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Tear the subscription down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that tears this subscription down when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Producer side of a [`ChangeSubscription`].
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::UnboundedSender<ChangeEvent>,
    cancel: CancellationToken,
}

impl ChangeSender {
    /// Returns false once the subscription is gone.
    pub fn send(&self, event: ChangeEvent) -> bool {
        !self.cancel.is_cancelled() && self.tx.send(event).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer unsubscribes.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Source of table change subscriptions.
#[cfg_attr(test, mockall::automock)]
pub trait ChangeFeed: Send + Sync + 'static {
    /// Open a subscription. Must be called within a tokio runtime.
    fn subscribe(&self, request: &ChangeRequest) -> ChangeSubscription;
}
