//! # Space-weather ingestion, alignment and alerting pipeline
//!
//! One cycle fetches every upstream product, parses it against its declarative
//! schema, aligns the telemetry feeds onto a per-minute timeline, persists the
//! timeline and raises deduplicated alerts.
//!
//! ## Feeds
//!
//! | Feed | Format | Cadence |
//! |------|--------|---------|
//! | ACE SWEPAM (plasma) | whitespace table | 1 min |
//! | ACE magnetometer | whitespace table | 1 min |
//! | OVATION hemispheric power nowcast | whitespace table | 5 min |
//! | Planetary Kp (estimated) | JSON records | 1 min |
//! | 3-day forecast | text product, Kp breakdown grid | daily |
//! | CME event log | JSON array | irregular |
//!
//! ## Schema Reference
//!
//! All stored types match the SQL schema in `/sql/`:
//! - `space_weather_records` → `Record`
//! - `sent_alerts` → `AlertKey`
//! - `kp_forecasts` → `ForecastGrid`
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (Record, Column, CmeEvent)
//! - `parser` - Feed schemas and payload parsing
//! - `aligner` - Per-minute merge with forward-fill
//! - `forecast` - 3-day Kp grid scanner
//! - `db` - Record store and schema bootstrap
//! - `alerts` - Alert deduplication store
//! - `query` - Read-only query surface
//! - `signals` - Real-time threshold detection
//! - `report` - Alert subjects and bodies
//! - `fetch` / `notify` - Network collaborators
//! - `engine` / `scheduler` - Cycle orchestration

pub mod aligner;
pub mod alerts;
pub mod config;
pub mod db;
pub mod engine;
pub mod fetch;
pub mod forecast;
pub mod notify;
pub mod parser;
pub mod query;
pub mod report;
pub mod scheduler;
pub mod signals;
pub mod types;

// Re-export commonly used types
pub use alerts::{AlertKey, AlertStore};
pub use config::{MonitorConfig, ReportMode, Thresholds};
pub use db::RecordStore;
pub use engine::{CycleReport, PipelineEngine};
pub use fetch::{Feed, FeedSource, HttpFeedSource};
pub use forecast::{ForecastGrid, ForecastScan};
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use query::RecordQuery;
pub use types::{CmeEvent, LocalizedRecord, Record};
