//! In-process alert bus.
//!
//! Fire-and-forget fan-out of new alerts to any number of listeners. Events
//! published while nobody listens are dropped; slow listeners lag rather
//! than apply backpressure.

use sigstream_core::RealtimeAlert;
use tokio::sync::broadcast;
use tracing::trace;

/// Event name carried by every bus event.
pub const REALTIME_ALERT_EVENT: &str = "realtime-alert";

const DEFAULT_BUS_CAPACITY: usize = 256;

/// Event published for each new alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub name: &'static str,
    pub alert: RealtimeAlert,
}

/// Cheap to clone; clones share one channel.
#[derive(Debug, Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<AlertEvent>,
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an alert. Returns the number of listeners reached.
    pub fn publish(&self, alert: RealtimeAlert) -> usize {
        let event = AlertEvent {
            name: REALTIME_ALERT_EVENT,
            alert,
        };
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No alert listeners, event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
