//! Price streaming service.
//!
//! `PriceStream` registers one handler on the shared connection, keeps the
//! `PriceBook` current, and re-sends symbol subscriptions every time the
//! socket (re)opens. Consumers read throttled snapshots through
//! `PriceWatch`, which emits on the leading edge and then at most once per
//! throttle interval while updates keep arriving.

use crate::parser::{normalize_symbol, parse_feed_message, FeedEvent};
use crate::price_book::{PriceBook, PriceSnapshot};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sigstream_ws::{ConnectionManager, ConnectionState, HandlerId, HandlerResult, WsMessage};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Price streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceStreamConfig {
    /// Symbols subscribed at startup.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Default throttle for `watch`.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

fn default_throttle_ms() -> u64 {
    1000
}

impl Default for PriceStreamConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

/// Counters for applied and rejected feed messages.
#[derive(Debug, Default)]
pub struct StreamStats {
    ticks: AtomicU64,
    klines: AtomicU64,
    rejected: AtomicU64,
}

impl StreamStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn klines(&self) -> u64 {
        self.klines.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Price streaming service bound to one connection.
pub struct PriceStream {
    connection: ConnectionManager,
    book: Arc<PriceBook>,
    symbols: Arc<Mutex<BTreeSet<String>>>,
    stats: Arc<StreamStats>,
    handler_id: HandlerId,
    resubscribe_task: JoinHandle<()>,
    default_throttle: Duration,
}

impl PriceStream {
    /// Attach to `connection`. Must be called within a tokio runtime.
    pub fn new(connection: ConnectionManager, config: &PriceStreamConfig) -> Self {
        let book = Arc::new(PriceBook::new());
        let stats = Arc::new(StreamStats::default());
        let symbols: Arc<Mutex<BTreeSet<String>>> = Arc::new(Mutex::new(
            config.symbols.iter().map(|s| normalize_symbol(s)).collect(),
        ));

        let handler_id = {
            let book = book.clone();
            let stats = stats.clone();
            connection.add_message_handler(move |msg: &WsMessage| apply_message(&book, &stats, msg))
        };

        // Taken before the open check so every later transition is seen by
        // the watcher and an already open socket is handled here.
        let mut states = connection.state_changes();
        if *states.borrow_and_update() == ConnectionState::Open {
            let initial: Vec<String> = symbols.lock().iter().cloned().collect();
            if !initial.is_empty() {
                connection.send(&subscribe_message("subscribe", &initial));
            }
        }

        let resubscribe_task = tokio::spawn(resubscribe_on_open(
            connection.clone(),
            symbols.clone(),
            states,
        ));

        Self {
            connection,
            book,
            symbols,
            stats,
            handler_id,
            resubscribe_task,
            default_throttle: Duration::from_millis(config.throttle_ms),
        }
    }

    /// Add symbols to the subscription set.
    ///
    /// Returns true if a subscribe message went out now; otherwise the
    /// symbols are sent once the socket opens.
    pub fn subscribe<I, S>(&self, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added: Vec<String> = {
            let mut set = self.symbols.lock();
            symbols
                .into_iter()
                .map(|s| normalize_symbol(s.as_ref()))
                .filter(|s| !s.is_empty() && set.insert(s.clone()))
                .collect()
        };
        if added.is_empty() {
            return false;
        }
        self.connection.send(&subscribe_message("subscribe", &added))
    }

    /// Remove symbols from the subscription set.
    pub fn unsubscribe<I, S>(&self, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed: Vec<String> = {
            let mut set = self.symbols.lock();
            symbols
                .into_iter()
                .map(|s| normalize_symbol(s.as_ref()))
                .filter(|s| set.remove(s))
                .collect()
        };
        if removed.is_empty() {
            return false;
        }
        self.connection.send(&subscribe_message("unsubscribe", &removed))
    }

    pub fn subscribed_symbols(&self) -> Vec<String> {
        self.symbols.lock().iter().cloned().collect()
    }

    /// Watch `symbols` with the given throttle (config default when `None`).
    pub fn watch<I, S>(&self, symbols: I, throttle: Option<Duration>) -> PriceWatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols
            .into_iter()
            .map(|s| normalize_symbol(s.as_ref()))
            .collect();
        let throttle = throttle.unwrap_or(self.default_throttle);

        // Capture before spawning so updates racing the spawn are not missed.
        let seen = self.book.version();
        let (tx, rx) = watch::channel(self.book.snapshot(&symbols));
        let task = tokio::spawn(run_throttled(
            self.book.clone(),
            symbols,
            throttle,
            seen,
            tx,
        ));

        PriceWatch { rx, task }
    }

    pub fn book(&self) -> &Arc<PriceBook> {
        &self.book
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Detach from the connection. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.connection.remove_message_handler(self.handler_id) {
            info!("Price stream detached");
        }
        self.resubscribe_task.abort();
    }
}

impl Drop for PriceStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Throttled view on a set of symbols.
///
/// Dropping it stops the background task.
pub struct PriceWatch {
    rx: watch::Receiver<PriceSnapshot>,
    task: JoinHandle<()>,
}

impl PriceWatch {
    /// Most recent published snapshot.
    pub fn latest(&self) -> PriceSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> Option<PriceSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl Drop for PriceWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Apply one socket message to the book.
///
/// Unrelated message types are ignored; unparseable feed messages are
/// counted and reported to the handler registry, which logs them.
pub fn apply_message(book: &PriceBook, stats: &StreamStats, msg: &WsMessage) -> HandlerResult {
    match parse_feed_message(msg) {
        Ok(Some(FeedEvent::Price(tick))) => {
            if book.update_tick(tick) {
                stats.ticks.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
        Ok(Some(FeedEvent::Kline(kline))) => {
            if book.update_kline(kline) {
                stats.klines.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            stats.rejected.fetch_add(1, Ordering::Relaxed);
            Err(e.into())
        }
    }
}

fn subscribe_message(kind: &str, symbols: &[String]) -> WsMessage {
    WsMessage::new(kind).with("symbols", symbols.to_vec())
}

async fn resubscribe_on_open(
    connection: ConnectionManager,
    symbols: Arc<Mutex<BTreeSet<String>>>,
    mut states: watch::Receiver<ConnectionState>,
) {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        if state != ConnectionState::Open {
            continue;
        }
        let list: Vec<String> = symbols.lock().iter().cloned().collect();
        if list.is_empty() {
            continue;
        }
        let sent = connection.send(&subscribe_message("subscribe", &list));
        debug!(count = list.len(), sent, "Resubscribed price symbols");
    }
}

async fn run_throttled(
    book: Arc<PriceBook>,
    symbols: Vec<String>,
    throttle: Duration,
    mut seen: u64,
    tx: watch::Sender<PriceSnapshot>,
) {
    loop {
        {
            let notified = book.changed().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if book.version() == seen {
                tokio::select! {
                    () = &mut notified => {}
                    () = tx.closed() => return,
                }
            }
        }

        seen = book.version();
        let next = book.snapshot(&symbols);
        tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        tokio::time::sleep(throttle).await;
    }
}
