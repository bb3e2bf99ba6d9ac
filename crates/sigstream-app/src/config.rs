//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sigstream_feed::PriceStreamConfig;
use sigstream_realtime::AlertConfig;
use sigstream_ws::ConnectionConfig;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SIGSTREAM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Interval of the periodic metrics summary log.
    #[serde(default = "default_metrics_log_interval_secs")]
    pub metrics_log_interval_secs: u64,
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
        }
    }
}

impl TelemetryConfig {
    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_log_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub prices: PriceStreamConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Config path: CLI argument > `SIGSTREAM_CONFIG` > default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load from a TOML file and apply environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Supabase credentials from the environment win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(SUPABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.alerts.supabase_url = Some(url);
        }
        if let Some(key) = lookup(SUPABASE_ANON_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.alerts.supabase_anon_key = Some(key);
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.connection.reconnect_base_delay_ms == 0 {
            return Err(AppError::Config(
                "connection.reconnect_base_delay_ms must be positive".to_string(),
            ));
        }
        if self.prices.throttle_ms == 0 {
            return Err(AppError::Config("prices.throttle_ms must be positive".to_string()));
        }
        if self.alerts.capacity == 0 {
            return Err(AppError::Config("alerts.capacity must be positive".to_string()));
        }
        Ok(())
    }
}
