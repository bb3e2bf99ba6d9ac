//! Application wiring.
//!
//! Owns the single `ConnectionManager` and hands clones to the price
//! stream. The alert subscriber follows the configured identity and
//! republishes inserts on the alert bus, which this loop listens to.

use crate::config::AppConfig;
use crate::error::AppResult;
use sigstream_core::UserId;
use sigstream_feed::{PriceStream, PriceWatch};
use sigstream_realtime::{AlertBus, AlertSubscriber, FeedHealth};
use sigstream_telemetry::Metrics;
use sigstream_ws::{ConnectionManager, ConnectionState};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    connection: ConnectionManager,
    prices: Arc<PriceStream>,
    alerts: Arc<AlertSubscriber>,
    bus: AlertBus,
}

/// Last values pushed to the Prometheus counters.
#[derive(Debug, Default)]
struct Reported {
    reconnects: u64,
    malformed: u64,
    ticks: u64,
    klines: u64,
    price_rejected: u64,
    inserted: u64,
    updated: u64,
    alert_rejected: u64,
}

fn delta(last: &mut u64, now: u64) -> u64 {
    let d = now.saturating_sub(*last);
    *last = now;
    d
}

impl Application {
    /// Build all components. Must be called within a tokio runtime.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let connection = ConnectionManager::new(config.connection.clone());
        let prices = Arc::new(PriceStream::new(connection.clone(), &config.prices));
        let bus = AlertBus::default();
        let alerts = Arc::new(AlertSubscriber::from_config(&config.alerts, bus.clone()));

        Ok(Self {
            config,
            connection,
            prices,
            alerts,
            bus,
        })
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn prices(&self) -> Arc<PriceStream> {
        self.prices.clone()
    }

    pub fn alerts(&self) -> Arc<AlertSubscriber> {
        self.alerts.clone()
    }

    pub fn bus(&self) -> &AlertBus {
        &self.bus
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, then tear everything down.
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> AppResult<()> {
        let mut states = self.connection.state_changes();
        let mut health = self.alerts.health_changes();
        let mut bus_events = self.bus.subscribe();

        Metrics::connection_state(self.connection.state().as_str());
        Metrics::alert_feed_health(self.alerts.health().as_str());

        self.connection.connect().await;
        info!(state = %self.connection.state(), "Initial connection attempt finished");

        let identity = self.config.alerts.user_id.clone().map(UserId::new);
        self.alerts.set_identity(identity);

        let mut watch: Option<PriceWatch> = if self.config.prices.symbols.is_empty() {
            None
        } else {
            Some(self.prices.watch(&self.config.prices.symbols, None))
        };

        let mut reported = Reported::default();
        let mut summary = tokio::time::interval(self.config.telemetry.metrics_log_interval());
        summary.tick().await;

        tokio::pin!(shutdown);
        info!("Entering main event loop");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *states.borrow_and_update();
                    self.on_connection_state(state);
                }

                changed = health.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = health.borrow_and_update().clone();
                    on_feed_health(&current);
                }

                event = bus_events.recv() => {
                    match event {
                        Ok(event) => {
                            info!(
                                event = event.name,
                                id = %event.alert.id,
                                ticker = %event.alert.ticker,
                                signal = %event.alert.signal_type,
                                price = %event.alert.price,
                                timeframe = %event.alert.timeframe,
                                "Realtime alert"
                            );
                            Metrics::alerts_retained(self.alerts.alert_count());
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Alert listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                snapshot = next_snapshot(&mut watch) => {
                    match snapshot {
                        Some(snapshot) => {
                            for (symbol, tick) in &snapshot.ticks {
                                debug!(
                                    %symbol,
                                    price = %tick.price,
                                    change_pct = %tick.change_percent_24h,
                                    "Price"
                                );
                            }
                        }
                        None => watch = None,
                    }
                }

                _ = summary.tick() => {
                    self.report(&mut reported);
                }
            }
        }

        self.shutdown();
        self.report(&mut reported);
        Ok(())
    }

    fn on_connection_state(&self, state: ConnectionState) {
        Metrics::connection_state(state.as_str());
        if state == ConnectionState::Closed && !self.connection.has_pending_reconnect() {
            warn!("Live updates unavailable");
        }
    }

    /// Push counter deltas to Prometheus and log a summary.
    fn report(&self, last: &mut Reported) {
        let stats = self.prices.stats();
        let alert_stats = self.alerts.stats();

        Metrics::reconnect_attempts(delta(&mut last.reconnects, self.connection.reconnect_count()));
        Metrics::malformed_messages(delta(&mut last.malformed, self.connection.malformed_messages()));
        Metrics::price_updates("tick", delta(&mut last.ticks, stats.ticks()));
        Metrics::price_updates("kline", delta(&mut last.klines, stats.klines()));
        Metrics::price_updates("rejected", delta(&mut last.price_rejected, stats.rejected()));
        Metrics::alert_events("insert", delta(&mut last.inserted, alert_stats.inserted()));
        Metrics::alert_events("update", delta(&mut last.updated, alert_stats.updated()));
        Metrics::alert_events("rejected", delta(&mut last.alert_rejected, alert_stats.rejected()));
        Metrics::alerts_retained(self.alerts.alert_count());

        info!(
            connection = %self.connection.state(),
            symbols = self.prices.book().symbol_count(),
            ticks = last.ticks,
            alerts = self.alerts.alert_count(),
            alert_feed = %self.alerts.health(),
            "Status summary"
        );
    }

    fn shutdown(&self) {
        info!("Shutting down");
        self.alerts.shutdown();
        self.prices.shutdown();
        self.connection.disconnect();
    }
}

fn on_feed_health(health: &FeedHealth) {
    Metrics::alert_feed_health(health.as_str());
    match health {
        FeedHealth::Connected => info!("Realtime alerts live"),
        FeedHealth::Error(reason) => warn!(%reason, "Realtime alerts unavailable"),
        FeedHealth::Pending | FeedHealth::NotConfigured => debug!(health = %health, "Alert feed health"),
    }
}

async fn next_snapshot(watch: &mut Option<PriceWatch>) -> Option<sigstream_feed::PriceSnapshot> {
    match watch.as_mut() {
        Some(watch) => watch.changed().await,
        None => std::future::pending().await,
    }
}
