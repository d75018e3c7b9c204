//! Pipeline Runtime - periodic space-weather monitoring
//!
//! Fetches every feed, aligns and persists the per-minute timeline and
//! delivers deduplicated alerts, once per poll interval.
//!
//! Usage:
//!   cargo run --release --bin pipeline_runtime
//!
//! Environment variables (see `MonitorConfig::from_env` for the full list):
//!   AURORA_DB_PATH - SQLite database path (default: aurora_data.db)
//!   AURORA_POLL_INTERVAL_SECS - Cycle interval (default: 60)
//!   AURORA_OBSERVATION_WINDOW_MINS - Stop after this long (default: run until Ctrl+C)
//!   AURORA_REPORT_MODE - silent | strong (default: silent)
//!   AURORA_WEBHOOK_URL - Deliver alerts to this webhook (default: log only)
//!   AURORA_CONFIG_FILE - JSON file replacing the whole environment config

use auroraflow::pipeline::{
    config::MonitorConfig,
    engine::PipelineEngine,
    fetch::{FeedSource, HttpFeedSource},
    notify::{LogNotifier, Notifier, WebhookNotifier},
    scheduler::run_scheduler,
};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Aurora Pipeline Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = MonitorConfig::resolve();

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Poll interval: {}s", config.poll_interval_secs);
    match config.observation_window_mins {
        Some(mins) => info!("   ├─ Observation window: {} min", mins),
        None => info!("   ├─ Observation window: until Ctrl+C"),
    }
    info!("   ├─ Report mode: {:?}", config.report_mode);
    info!("   ├─ Recipients: {}", config.recipients.len());
    info!("   ├─ Fetch timeout: {}s", config.fetch_timeout_secs);
    info!("   └─ Display timezone: {}", config.display_timezone);

    let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(
        config.feeds.clone(),
        config.fetch_timeout_secs,
    )?);

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            info!("📧 Delivering via webhook");
            Arc::new(WebhookNotifier::new(url.clone(), config.fetch_timeout_secs)?)
        }
        None => {
            info!("📧 Delivering to log only (set AURORA_WEBHOOK_URL to deliver)");
            Arc::new(LogNotifier)
        }
    };

    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let window = config
        .observation_window_mins
        .map(|mins| Duration::from_secs(mins * 60));

    let engine = Arc::new(PipelineEngine::new(config, source, notifier)?);
    info!("✅ PipelineEngine created");

    match run_scheduler(engine, poll_interval, window).await {
        Ok(reason) => {
            info!("👋 Pipeline stopped: {:?}", reason);
            Ok(())
        }
        Err(e) => {
            error!("❌ Pipeline aborted: {}", e);
            Err(e.into())
        }
    }
}
