//! sigstream headless client - entry point.

use anyhow::Result;
use clap::Parser;
use sigstream_app::{AppConfig, Application};
use tracing::info;

/// Headless sigstream client: live prices and realtime alerts.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGSTREAM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any wss:// connection
    sigstream_ws::init_crypto();

    let args = Args::parse();

    sigstream_telemetry::init_logging()?;

    info!("Starting sigstream v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");

    let config = AppConfig::from_file(&config_path)?;
    info!(
        origin = %config.connection.page_origin,
        symbols = ?config.prices.symbols,
        alerts_configured = config.alerts.is_configured(),
        "Configuration loaded"
    );

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
