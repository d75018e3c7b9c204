//! Pipeline Engine - one run-to-completion monitoring cycle
//!
//! ```text
//! FeedSource::fetch (each feed independently)
//!     ↓
//! parser::parse / forecast::scan / parser::parse_cme_events
//!     ↓
//! aligner::merge → RecordStore::upsert_records
//!     ↓
//! SignalDetector / ForecastScan / CME events
//!     ↓
//! AlertStore::check_and_record → Notifier::deliver
//! ```
//!
//! Failure policy: a fetch or format failure only removes that feed from the
//! cycle; a broken forecast grid skips forecast alerting and notifies the
//! operator; a persistence failure aborts the cycle, notifies the operator and
//! is returned to the caller.

use super::aligner::{merge, FeedStream};
use super::alerts::{AlertKey, AlertStore};
use super::config::{MonitorConfig, ReportMode};
use super::db::RecordStore;
use super::fetch::{Feed, FeedSource};
use super::forecast::{self, ForecastScan};
use super::notify::Notifier;
use super::parser::{parse, parse_cme_events};
use super::query::{parse_display_zone, DisplayZone, RecordQuery};
use super::report::{self, Report};
use super::signals::SignalDetector;
use super::types::{CmeEvent, Record};
use crate::error::{ErrorKind, MonitorError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use std::sync::{Arc, Mutex};

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub feeds_ok: Vec<Feed>,
    pub feeds_failed: Vec<(Feed, ErrorKind)>,
    pub records_aligned: usize,
    pub records_inserted: usize,
    pub forecast: Option<ForecastScan>,
    pub forecast_error: Option<String>,
    pub cme_events_seen: usize,
    /// Keys newly recorded this cycle, in delivery order
    pub alerts_sent: Vec<AlertKey>,
    pub deliveries: usize,
    pub delivery_failures: usize,
}

impl CycleReport {
    pub fn all_feeds_absent(&self) -> bool {
        self.feeds_ok.is_empty() && !self.feeds_failed.is_empty()
    }
}

/// Pipeline engine orchestrating fetch, alignment, persistence and alerting
pub struct PipelineEngine {
    config: MonitorConfig,
    display_zone: DisplayZone,
    source: Arc<dyn FeedSource>,
    notifier: Arc<dyn Notifier>,
    records: RecordStore,
    alerts: AlertStore,
    query: Mutex<RecordQuery>,
    detector: SignalDetector,

    /// Clock (injectable for tests)
    now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl PipelineEngine {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Self::new_with_clock(config, source, notifier, Arc::new(Utc::now))
    }

    /// Create engine with a custom clock
    pub fn new_with_clock(
        config: MonitorConfig,
        source: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
        now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Result<Self> {
        let display_zone = parse_display_zone(&config.display_timezone)?;
        let records = RecordStore::open(&config.db_path)?;
        let alerts = AlertStore::open_with_clock(&config.db_path, now_fn.clone())?;
        let query = RecordQuery::open(&config.db_path)?;
        let detector = SignalDetector::new(config.thresholds.clone());

        Ok(Self {
            config,
            display_zone,
            source,
            notifier,
            records,
            alerts,
            query: Mutex::new(query),
            detector,
            now_fn,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one full cycle.
    ///
    /// Only fatal (persistence) errors are returned; the operator has already
    /// been notified when that happens.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let now = (self.now_fn)();
        let mut cycle = CycleReport::default();

        match self.run_stages(now, &mut cycle).await {
            Ok(()) => {
                log::info!(
                    "✅ Cycle complete: {}/{} feeds, {} records ({} new), {} alerts",
                    cycle.feeds_ok.len(),
                    cycle.feeds_ok.len() + cycle.feeds_failed.len(),
                    cycle.records_aligned,
                    cycle.records_inserted,
                    cycle.alerts_sent.len()
                );
                Ok(cycle)
            }
            Err(e) => {
                log::error!("❌ Cycle aborted: {}", e);
                let notice = report::error_report("pipeline run", &e.to_string());
                self.deliver_to_operator(&notice, &mut cycle).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, now: DateTime<Utc>, cycle: &mut CycleReport) -> Result<()> {
        let streams = self.fetch_telemetry(cycle).await;
        let forecast_text = self.fetch_document(Feed::KpForecast, cycle).await;
        let cme_text = self.fetch_document(Feed::CmeEvents, cycle).await;

        let cme_events = cme_text.and_then(|raw| match parse_cme_events(&raw) {
            Ok(events) => Some(events),
            Err(e) => {
                log::warn!("⚠️  {}", e);
                cycle.feeds_ok.retain(|f| *f != Feed::CmeEvents);
                cycle.feeds_failed.push((Feed::CmeEvents, e.kind()));
                None
            }
        });

        if cycle.all_feeds_absent() {
            log::error!("❌ Every feed is unavailable this cycle");
            let failed: Vec<String> = cycle
                .feeds_failed
                .iter()
                .map(|(feed, kind)| format!("{} ({})", feed, kind.as_str()))
                .collect();
            let error = format!("all feeds unavailable: {}", failed.join(", "));
            self.notify_operator_error("feed retrieval", &error, now, cycle).await?;
            return Ok(());
        }

        // Align and persist
        let aligned = merge(&streams);
        cycle.records_aligned = aligned.len();
        cycle.records_inserted = self.records.upsert_records(&aligned, now)?;

        // Forecast grid
        if let Some(text) = forecast_text {
            self.process_forecast(&text, now, cycle).await?;
        }

        // CME events
        if let Some(events) = cme_events {
            cycle.cme_events_seen = events.len();
            self.process_cme_events(&events, now, cycle).await?;
        }

        // Real-time readings and predicted arrival
        let latest = aligned.last();
        if let Some(record) = latest {
            self.process_realtime(record, now, cycle).await?;
        }
        self.process_arrival(now, cycle).await?;

        if self.config.report_mode == ReportMode::Strong {
            let total = cycle.feeds_ok.len() + cycle.feeds_failed.len();
            let summary = report::status_summary(
                now,
                self.display_zone,
                latest,
                cycle.feeds_ok.len(),
                total,
                cycle.records_inserted,
            );
            let recipients = self.alert_recipients();
            self.deliver(&summary, &recipients, cycle).await;
        }

        Ok(())
    }

    async fn fetch_telemetry(&self, cycle: &mut CycleReport) -> Vec<FeedStream> {
        let mut streams = Vec::new();
        for feed in Feed::TELEMETRY {
            let Some(schema) = feed.schema() else {
                continue;
            };
            let rows = match self.source.fetch(feed).await {
                Ok(raw) => parse(&raw, schema),
                Err(e) => Err(e),
            };
            match rows {
                Ok(rows) => {
                    log::debug!("📥 {}: {} rows", feed, rows.len());
                    cycle.feeds_ok.push(feed);
                    streams.push(FeedStream::new(schema, rows));
                }
                Err(e) => {
                    log::warn!("⚠️  {} absent this cycle: {}", feed, e);
                    cycle.feeds_failed.push((feed, e.kind()));
                }
            }
        }
        streams
    }

    async fn fetch_document(&self, feed: Feed, cycle: &mut CycleReport) -> Option<String> {
        match self.source.fetch(feed).await {
            Ok(raw) => {
                cycle.feeds_ok.push(feed);
                Some(raw)
            }
            Err(e) => {
                log::warn!("⚠️  {} absent this cycle: {}", feed, e);
                cycle.feeds_failed.push((feed, e.kind()));
                None
            }
        }
    }

    async fn process_forecast(
        &self,
        text: &str,
        now: DateTime<Utc>,
        cycle: &mut CycleReport,
    ) -> Result<()> {
        let today = now.date_naive();
        let scan = match forecast::scan(text, &self.config.thresholds, today) {
            Ok(scan) => scan,
            Err(e) => {
                log::error!("❌ {}", e);
                cycle.forecast_error = Some(e.to_string());
                self.notify_operator_error("KP forecast retrieval", &e.to_string(), now, cycle)
                    .await?;
                return Ok(());
            }
        };

        self.records.upsert_forecast_grid(today, &scan.grid, now)?;

        let mut new_dates: Vec<NaiveDate> = Vec::new();
        let mut new_severe = false;
        for date in &scan.severe_dates {
            if self.record_key(&AlertKey::kp_severe(*date), cycle)? {
                new_severe = true;
                new_dates.push(*date);
            }
        }
        for date in &scan.interesting_dates {
            if self.record_key(&AlertKey::kp_elevated(*date), cycle)? && !new_dates.contains(date) {
                new_dates.push(*date);
            }
        }
        new_dates.sort();

        if let Some(alert) = report::forecast_alert(&scan, &new_dates, new_severe) {
            log::info!("🌌 Forecast alert for {} day(s)", new_dates.len());
            let recipients = self.alert_recipients();
            self.deliver(&alert, &recipients, cycle).await;
        } else if !scan.elevated && now.weekday() == Weekday::Sun {
            if self.record_key(&AlertKey::heartbeat(today), cycle)? {
                let heartbeat = report::heartbeat_report();
                self.deliver_to_operator(&heartbeat, cycle).await;
            }
        }

        cycle.forecast = Some(scan);
        Ok(())
    }

    async fn process_cme_events(
        &self,
        events: &[CmeEvent],
        now: DateTime<Utc>,
        cycle: &mut CycleReport,
    ) -> Result<()> {
        let today = now.date_naive();
        for event in events {
            let key = AlertKey::cme(&event.t0);
            if !self.alerts.is_event_today(&key) {
                continue;
            }
            if !self.record_key(&key, cycle)? {
                continue;
            }
            let ordinal = self.alerts.count_family_on("cme", today)?;
            log::info!("☀️  New CME today: {} (#{})", event.t0, ordinal);
            let alert = report::cme_alert(event, ordinal);
            let recipients = self.alert_recipients();
            self.deliver(&alert, &recipients, cycle).await;
        }
        Ok(())
    }

    async fn process_realtime(
        &self,
        record: &Record,
        now: DateTime<Utc>,
        cycle: &mut CycleReport,
    ) -> Result<()> {
        for signal in self.detector.detect_realtime(record) {
            let key = AlertKey::realtime(signal.signal_type.as_str(), now.date_naive());
            if !self.record_key(&key, cycle)? {
                continue;
            }
            log::info!(
                "⚡ Real-time {} at {:.2} (threshold {:.2})",
                signal.signal_type.as_str(),
                signal.value,
                signal.threshold
            );
            let alert = report::realtime_alert(&signal, self.display_zone);
            let recipients = self.alert_recipients();
            self.deliver(&alert, &recipients, cycle).await;
        }
        Ok(())
    }

    async fn process_arrival(&self, now: DateTime<Utc>, cycle: &mut CycleReport) -> Result<()> {
        let nearest = {
            let query = self
                .query
                .lock()
                .map_err(|_| MonitorError::Persistence("query lock poisoned".to_string()))?;
            query.nearest(now)?
        };

        let Some(signal) = nearest.and_then(|r| self.detector.detect_arrival(&r, now)) else {
            return Ok(());
        };
        if !self.record_key(&AlertKey::arrival(&signal.forecast), cycle)? {
            return Ok(());
        }

        log::info!(
            "🌠 Predicted arrival {} with {:.0} GW",
            signal.forecast,
            signal.north_power
        );
        let alert = report::arrival_alert(&signal, self.display_zone);
        let recipients = self.alert_recipients();
        self.deliver(&alert, &recipients, cycle).await;
        Ok(())
    }

    fn record_key(&self, key: &AlertKey, cycle: &mut CycleReport) -> Result<bool> {
        let fresh = self.alerts.check_and_record(key)?;
        if fresh {
            cycle.alerts_sent.push(key.clone());
        }
        Ok(fresh)
    }

    /// Operator notice for a failed stage, sent once per stage per UTC day.
    async fn notify_operator_error(
        &self,
        stage: &str,
        error: &str,
        now: DateTime<Utc>,
        cycle: &mut CycleReport,
    ) -> Result<()> {
        let key = AlertKey::operator_error(stage, now.date_naive());
        if self.record_key(&key, cycle)? {
            let notice = report::error_report(stage, error);
            self.deliver_to_operator(&notice, cycle).await;
        } else {
            log::debug!("🔇 Operator already notified today ({})", key);
        }
        Ok(())
    }

    /// Alert recipients; the operator stands in when none are configured.
    fn alert_recipients(&self) -> Vec<String> {
        if self.config.recipients.is_empty() {
            vec![self.config.operator_recipient.clone()]
        } else {
            self.config.recipients.clone()
        }
    }

    async fn deliver_to_operator(&self, message: &Report, cycle: &mut CycleReport) {
        let operator = [self.config.operator_recipient.clone()];
        self.deliver(message, &operator, cycle).await;
    }

    async fn deliver(&self, message: &Report, recipients: &[String], cycle: &mut CycleReport) {
        for recipient in recipients {
            cycle.deliveries += 1;
            if let Err(e) = self
                .notifier
                .deliver(&message.subject, &message.body, recipient)
                .await
            {
                cycle.delivery_failures += 1;
                log::warn!("⚠️  {}", e);
            }
        }
    }
}
