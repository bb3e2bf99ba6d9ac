//! Inbound message handler registry.
//!
//! Handlers run in registration order. A handler that returns an error or
//! panics is logged and skipped; later handlers still see the message.

use crate::message::WsMessage;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Error returned by a message handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a message handler.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&WsMessage) -> HandlerResult + Send + Sync>;

/// Registration handle used to remove a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered set of message handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at the end of the dispatch order.
    pub fn add<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&WsMessage) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Deliver a message to every handler.
    ///
    /// Returns the number of handlers that completed without error.
    pub fn dispatch(&self, msg: &WsMessage) -> usize {
        // Snapshot so handlers may register or remove handlers re-entrantly.
        let snapshot: Vec<(HandlerId, Handler)> = self.handlers.read().clone();
        let mut delivered = 0;

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(msg))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(handler = ?id, kind = %msg.kind, error = %e, "Message handler failed");
                }
                Err(_) => {
                    error!(handler = ?id, kind = %msg.kind, "Message handler panicked");
                }
            }
        }

        delivered
    }
}
