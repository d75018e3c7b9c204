//! Alert deduplication store
//!
//! `check_and_record` is the only way an alert becomes deliverable: the key is
//! inserted inside one `BEGIN IMMEDIATE` transaction and only the caller whose
//! insert actually landed sees `true`. The key is persisted before any
//! delivery is attempted, so a failed delivery is never retried.

use super::db::open_writer;
use crate::error::{MonitorError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rusqlite::{params, Connection, TransactionBehavior};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

fn embedded_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid date regex"))
}

/// Opaque identity of a reportable event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey(String);

impl AlertKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// CME detection, keyed by its first-detection timestamp
    pub fn cme(t0: &str) -> Self {
        Self(format!("cme:{t0}"))
    }

    pub fn kp_elevated(date: NaiveDate) -> Self {
        Self(format!("kp-elevated:{}", date.format("%Y-%m-%d")))
    }

    pub fn kp_severe(date: NaiveDate) -> Self {
        Self(format!("kp-severe:{}", date.format("%Y-%m-%d")))
    }

    /// Real-time signal; at most one per signal per UTC day
    pub fn realtime(signal: &str, date: NaiveDate) -> Self {
        Self(format!("realtime-{signal}:{}", date.format("%Y-%m-%d")))
    }

    /// Predicted arrival, keyed by the nowcast forecast stamp
    pub fn arrival(forecast: &str) -> Self {
        Self(format!("arrival:{forecast}"))
    }

    pub fn heartbeat(date: NaiveDate) -> Self {
        Self(format!("heartbeat:{}", date.format("%Y-%m-%d")))
    }

    /// Operator error notice for a pipeline stage; at most one per stage per UTC day
    pub fn operator_error(stage: &str, date: NaiveDate) -> Self {
        let stage = stage.trim().to_ascii_lowercase().replace(' ', "-");
        Self(format!("error:{stage}:{}", date.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key family (text before the first `:`).
    pub fn family(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// First `YYYY-MM-DD` embedded in the key, if it is a real date.
    pub fn embedded_date(&self) -> Option<NaiveDate> {
        let m = embedded_date_re().find(&self.0)?;
        NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok()
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable set of already-emitted alert keys (`sent_alerts` table)
#[derive(Clone)]
pub struct AlertStore {
    conn: Arc<Mutex<Connection>>,
    now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AlertStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(Utc::now))
    }

    /// Open with an injected clock (used by `is_event_today` and `recorded_at`).
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        now_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Result<Self> {
        let conn = open_writer(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            now_fn,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MonitorError::Persistence("alert store lock poisoned".to_string()))
    }

    /// Record `key` if unseen. `true` means the caller owns the alert.
    pub fn check_and_record(&self, key: &AlertKey) -> Result<bool> {
        let now = (self.now_fn)();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO sent_alerts (alert_key, event_date, recorded_at) VALUES (?, ?, ?)",
            params![
                key.as_str(),
                key.embedded_date().map(|d| d.format("%Y-%m-%d").to_string()),
                now.timestamp(),
            ],
        )?;
        tx.commit()?;

        if inserted == 1 {
            log::debug!("🆕 Alert key recorded: {}", key);
        } else {
            log::debug!("🔁 Alert key already sent: {}", key);
        }
        Ok(inserted == 1)
    }

    /// True when the key's embedded date is today (UTC).
    pub fn is_event_today(&self, key: &AlertKey) -> bool {
        self.is_event_on(key, (self.now_fn)().date_naive())
    }

    pub fn is_event_on(&self, key: &AlertKey, date: NaiveDate) -> bool {
        key.embedded_date() == Some(date)
    }

    pub fn contains(&self, key: &AlertKey) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT 1 FROM sent_alerts WHERE alert_key = ?")?;
        Ok(stmt.exists([key.as_str()])?)
    }

    pub fn recorded_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sent_alerts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of recorded keys of one family whose event falls on `date`.
    pub fn count_family_on(&self, family: &str, date: NaiveDate) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sent_alerts WHERE event_date = ? AND alert_key LIKE ? || ':%'",
            params![date.format("%Y-%m-%d").to_string(), family],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;
    use tempfile::NamedTempFile;

    fn fixed_clock(y: i32, m: u32, d: u32) -> Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> {
        let at = Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap();
        Arc::new(move || at)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_key_is_new_exactly_once() {
        let temp = NamedTempFile::new().unwrap();
        let store = AlertStore::open(temp.path()).unwrap();
        let key = AlertKey::cme("2025-01-21T09:24:07.532");

        assert!(store.check_and_record(&key).unwrap());
        for _ in 0..5 {
            assert!(!store.check_and_record(&key).unwrap());
        }
        assert!(store.contains(&key).unwrap());
        assert_eq!(store.recorded_count().unwrap(), 1);
    }

    #[test]
    fn test_persisted_across_reopen() {
        let temp = NamedTempFile::new().unwrap();
        let key = AlertKey::kp_elevated(date(2025, 1, 21));
        {
            let store = AlertStore::open(temp.path()).unwrap();
            assert!(store.check_and_record(&key).unwrap());
        }
        let store = AlertStore::open(temp.path()).unwrap();
        assert!(!store.check_and_record(&key).unwrap());
    }

    #[test]
    fn test_concurrent_writers_single_winner() {
        let temp = NamedTempFile::new().unwrap();
        // Schema exists before the race starts
        AlertStore::open(temp.path()).unwrap();

        let path = temp.path().to_path_buf();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = AlertStore::open(&path).unwrap();
                    store
                        .check_and_record(&AlertKey::cme("2025-01-21T09:24:07.532"))
                        .unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_shared_store_across_threads() {
        let temp = NamedTempFile::new().unwrap();
        let store = AlertStore::open(temp.path()).unwrap();
        let key = AlertKey::realtime("kp", date(2025, 1, 21));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                thread::spawn(move || store.check_and_record(&key).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_is_event_today() {
        let temp = NamedTempFile::new().unwrap();
        let store = AlertStore::open_with_clock(temp.path(), fixed_clock(2025, 1, 21)).unwrap();

        assert!(store.is_event_today(&AlertKey::cme("2025-01-21T09:24:07.532")));
        assert!(!store.is_event_today(&AlertKey::cme("2025-01-20T23:59:00")));
        assert!(!store.is_event_today(&AlertKey::new("no-date-here")));
        assert!(!store.is_event_today(&AlertKey::new("cme:2025-02-30T00:00")));
        assert!(store.is_event_on(&AlertKey::kp_severe(date(2025, 1, 22)), date(2025, 1, 22)));
    }

    #[test]
    fn test_count_family_on() {
        let temp = NamedTempFile::new().unwrap();
        let store = AlertStore::open(temp.path()).unwrap();
        store.check_and_record(&AlertKey::cme("2025-01-21T09:24")).unwrap();
        store.check_and_record(&AlertKey::cme("2025-01-21T13:00")).unwrap();
        store.check_and_record(&AlertKey::cme("2025-01-20T13:00")).unwrap();
        store
            .check_and_record(&AlertKey::kp_elevated(date(2025, 1, 21)))
            .unwrap();

        assert_eq!(store.count_family_on("cme", date(2025, 1, 21)).unwrap(), 2);
        assert_eq!(store.count_family_on("kp-elevated", date(2025, 1, 21)).unwrap(), 1);
    }

    #[test]
    fn test_key_families() {
        assert_eq!(
            AlertKey::realtime("bulk-speed", date(2025, 3, 1)).as_str(),
            "realtime-bulk-speed:2025-03-01"
        );
        assert_eq!(AlertKey::arrival("2025-03-01_12:40").family(), "arrival");
        assert_eq!(
            AlertKey::arrival("2025-03-01_12:40").embedded_date(),
            Some(date(2025, 3, 1))
        );
        assert_eq!(AlertKey::heartbeat(date(2025, 3, 2)).to_string(), "heartbeat:2025-03-02");

        let error = AlertKey::operator_error("KP forecast retrieval", date(2025, 3, 2));
        assert_eq!(error.as_str(), "error:kp-forecast-retrieval:2025-03-02");
        assert_eq!(error.family(), "error");
        assert_eq!(error.embedded_date(), Some(date(2025, 3, 2)));
    }
}
