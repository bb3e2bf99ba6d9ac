//! Realtime alert subscriber.
//!
//! Follows one filtered change-feed subscription for the current identity,
//! keeps the most recent alerts, and republishes inserts on the alert bus.
//!
//! Identity changes tear the old subscription down and clear the list
//! before the new subscription is opened. A generation number, checked
//! under the state lock, discards events that were already in flight for
//! a torn-down subscription.

use crate::buffer::AlertBuffer;
use crate::bus::AlertBus;
use crate::change_feed::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeRequest, ChangeSubscription, RowFilter,
};
use crate::config::AlertConfig;
use crate::normalize::normalize_row;
use crate::supabase::SupabaseChangeFeed;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sigstream_core::{RealtimeAlert, UserId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Health of the alert subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedHealth {
    /// Subscribed, waiting for the server acknowledgement.
    Pending,
    Connected,
    Error(String),
    /// No change-feed backend configured; the subscriber is inert.
    NotConfigured,
}

impl FeedHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Error(_) => "error",
            Self::NotConfigured => "not_configured",
        }
    }
}

impl fmt::Display for FeedHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(reason) => write!(f, "error: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Row counters.
#[derive(Debug, Default)]
pub struct SubscriberStats {
    inserted: AtomicU64,
    updated: AtomicU64,
    rejected: AtomicU64,
}

impl SubscriberStats {
    pub fn inserted(&self) -> u64 {
        self.inserted.load(Ordering::Relaxed)
    }

    pub fn updated(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    /// Rows dropped because they could not be normalized.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

struct State {
    generation: u64,
    buffer: AlertBuffer,
}

struct Shared {
    state: Mutex<State>,
    health: watch::Sender<FeedHealth>,
    bus: AlertBus,
    stats: SubscriberStats,
}

struct Active {
    identity: Option<UserId>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Alert subscriber for one identity at a time.
pub struct AlertSubscriber {
    feed: Option<Arc<dyn ChangeFeed>>,
    schema: String,
    table: String,
    shared: Arc<Shared>,
    active: Mutex<Option<Active>>,
}

impl AlertSubscriber {
    /// Create a subscriber. `feed = None` yields an inert subscriber.
    pub fn new(feed: Option<Arc<dyn ChangeFeed>>, config: &AlertConfig, bus: AlertBus) -> Self {
        let initial = if feed.is_some() {
            FeedHealth::Pending
        } else {
            FeedHealth::NotConfigured
        };
        let (health, _) = watch::channel(initial);

        Self {
            feed,
            schema: config.schema.clone(),
            table: config.table.clone(),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    generation: 0,
                    buffer: AlertBuffer::new(config.capacity),
                }),
                health,
                bus,
                stats: SubscriberStats::default(),
            }),
            active: Mutex::new(None),
        }
    }

    /// Create a subscriber backed by Supabase Realtime when configured.
    ///
    /// An unusable project URL disables alerts like missing credentials do;
    /// the rest of the application keeps running.
    pub fn from_config(config: &AlertConfig, bus: AlertBus) -> Self {
        let feed: Option<Arc<dyn ChangeFeed>> = match config.credentials() {
            Some((url, key)) => match SupabaseChangeFeed::new(url, key) {
                Ok(feed) => Some(Arc::new(feed)),
                Err(e) => {
                    warn!(error = %e, "Invalid Supabase URL, realtime alerts disabled");
                    None
                }
            },
            None => {
                info!("Supabase not configured, realtime alerts disabled");
                None
            }
        };
        Self::new(feed, config, bus)
    }

    /// Follow alerts for `identity` (`None` = anonymous, system-wide only).
    ///
    /// Replaces any previous subscription; the alert list is cleared before
    /// the new one opens. Must be called within a tokio runtime.
    pub fn set_identity(&self, identity: Option<UserId>) {
        let Some(feed) = self.feed.as_ref() else {
            debug!("set_identity ignored, alerts not configured");
            return;
        };

        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            let healthy = !matches!(*self.shared.health.borrow(), FeedHealth::Error(_));
            if current.identity == identity && healthy {
                debug!("Identity unchanged, keeping subscription");
                return;
            }
        }

        if let Some(previous) = active.take() {
            teardown(previous);
        }
        let generation = self.shared.reset(FeedHealth::Pending);

        let request = ChangeRequest {
            schema: self.schema.clone(),
            table: self.table.clone(),
            filter: RowFilter::for_identity(identity.as_ref()),
        };
        info!(filter = %request.filter, table = %request.table, "Subscribing to alerts");

        let subscription = feed.subscribe(&request);
        let cancel = subscription.cancellation();
        let task = tokio::spawn(run_subscription(self.shared.clone(), generation, subscription));

        *active = Some(Active {
            identity,
            cancel,
            task,
        });
    }

    /// Current identity, if a subscription is active.
    pub fn identity(&self) -> Option<Option<UserId>> {
        self.active.lock().as_ref().map(|a| a.identity.clone())
    }

    /// Retained alerts, newest first.
    pub fn alerts(&self) -> Vec<RealtimeAlert> {
        self.shared.state.lock().buffer.to_vec()
    }

    pub fn alert_count(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn health(&self) -> FeedHealth {
        self.shared.health.borrow().clone()
    }

    pub fn health_changes(&self) -> watch::Receiver<FeedHealth> {
        self.shared.health.subscribe()
    }

    pub fn bus(&self) -> &AlertBus {
        &self.shared.bus
    }

    pub fn stats(&self) -> &SubscriberStats {
        &self.shared.stats
    }

    pub fn is_configured(&self) -> bool {
        self.feed.is_some()
    }

    /// Tear down the subscription. Idempotent; also runs on drop.
    ///
    /// Retained alerts stay readable.
    pub fn shutdown(&self) {
        if let Some(previous) = self.active.lock().take() {
            teardown(previous);
            self.shared.state.lock().generation += 1;
            info!("Alert subscription closed");
        }
    }
}

impl Drop for AlertSubscriber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn teardown(active: Active) {
    active.cancel.cancel();
    active.task.abort();
}

impl Shared {
    /// Start a new generation: clear the list and publish `health`.
    fn reset(&self, health: FeedHealth) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.buffer.clear();
        self.health.send_replace(health);
        state.generation
    }

    /// Set health if `generation` is still current.
    fn set_health(&self, generation: u64, health: FeedHealth) -> bool {
        let state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.health.send_replace(health);
        true
    }

    fn apply_row(&self, generation: u64, kind: ChangeKind, record: &Map<String, Value>) {
        let alert = match normalize_row(record, Utc::now()) {
            Ok(alert) => alert,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, kind = kind.as_str(), "Dropping invalid alert row");
                return;
            }
        };

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(id = %alert.id, "Discarding event from closed subscription");
            return;
        }

        match kind {
            ChangeKind::Insert => {
                state.buffer.insert(alert.clone());
                self.stats.inserted.fetch_add(1, Ordering::Relaxed);
                let id = alert.id.clone();
                let listeners = self.bus.publish(alert);
                debug!(%id, listeners, "New alert");
            }
            ChangeKind::Update => {
                let id = alert.id.clone();
                if state.buffer.update(alert) {
                    self.stats.updated.fetch_add(1, Ordering::Relaxed);
                    debug!(%id, "Alert updated");
                } else {
                    debug!(%id, "Update for unknown alert ignored");
                }
            }
        }
    }
}

async fn run_subscription(shared: Arc<Shared>, generation: u64, mut subscription: ChangeSubscription) {
    while let Some(event) = subscription.next().await {
        match event {
            ChangeEvent::Subscribed => {
                if shared.set_health(generation, FeedHealth::Connected) {
                    info!("Alert subscription active");
                }
            }
            ChangeEvent::Row { kind, record } => shared.apply_row(generation, kind, &record),
            ChangeEvent::Failed(reason) => {
                if shared.set_health(generation, FeedHealth::Error(reason.clone())) {
                    error!(%reason, "Alert subscription failed");
                }
                return;
            }
        }
    }

    let reason = "change feed closed".to_string();
    if shared.set_health(generation, FeedHealth::Error(reason.clone())) {
        warn!(%reason, "Alert subscription ended");
    }
}
