//! Alert feed configuration.

use serde::{Deserialize, Serialize};

/// Realtime alert configuration.
///
/// Without both `supabase_url` and `supabase_anon_key` the subscriber runs
/// inert and reports `NotConfigured`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Alerts retained per subscriber.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Identity to subscribe as at startup; anonymous when absent.
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_table() -> String {
    "signal_alerts".to_string()
}

fn default_capacity() -> usize {
    50
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            schema: default_schema(),
            table: default_table(),
            capacity: default_capacity(),
            user_id: None,
        }
    }
}

impl AlertConfig {
    /// URL and key, when both are present and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.supabase_url.as_deref().map(str::trim)?;
        let key = self.supabase_anon_key.as_deref().map(str::trim)?;
        if url.is_empty() || key.is_empty() {
            return None;
        }
        Some((url, key))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}
