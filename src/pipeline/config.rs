//! Monitor configuration from environment variables
//!
//! `MonitorConfig::resolve()` is the single entry point used by the binaries:
//! environment first (with `.env` loaded by the caller), then an optional JSON
//! override file named by `AURORA_CONFIG_FILE`. A valid override replaces the
//! environment-supplied configuration entirely; an invalid one is rejected as a
//! whole and the compiled-in defaults are used.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Named numeric cutoffs for every alert the pipeline can raise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Forecast Kp at or above this flags a day as elevated
    pub kp_elevated: f64,
    /// Forecast Kp at or above this flags severe (Kp 7-minus)
    pub kp_severe: f64,
    pub realtime_kp: f64,
    pub bulk_speed_kms: f64,
    pub nowcast_power_gw: f64,
    pub predicted_power_gw: f64,
    pub proton_density_pcc: f64,
    /// How close "now" must be to a predicted arrival to report it
    pub arrival_window_secs: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            kp_elevated: 5.0,
            kp_severe: 6.67,
            realtime_kp: 5.0,
            bulk_speed_kms: 500.0,
            nowcast_power_gw: 100.0,
            predicted_power_gw: 70.0,
            proton_density_pcc: 10.0,
            arrival_window_secs: 120,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("kp_elevated", self.kp_elevated),
            ("kp_severe", self.kp_severe),
            ("realtime_kp", self.realtime_kp),
            ("bulk_speed_kms", self.bulk_speed_kms),
            ("nowcast_power_gw", self.nowcast_power_gw),
            ("predicted_power_gw", self.predicted_power_gw),
            ("proton_density_pcc", self.proton_density_pcc),
        ];
        if let Some((name, _)) = named.iter().find(|(_, v)| !v.is_finite()) {
            return Err(MonitorError::Config(format!("threshold {name} is not finite")));
        }
        if self.kp_elevated > self.kp_severe {
            return Err(MonitorError::Config(format!(
                "kp_elevated ({}) exceeds kp_severe ({})",
                self.kp_elevated, self.kp_severe
            )));
        }
        if self.arrival_window_secs < 0 {
            return Err(MonitorError::Config(
                "arrival_window_secs must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// How chatty the monitor is towards recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Only threshold crossings are delivered
    #[default]
    Silent,
    /// Every cycle also delivers a status summary
    Strong,
}

impl FromStr for ReportMode {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(ReportMode::Silent),
            "strong" => Ok(ReportMode::Strong),
            other => Err(MonitorError::Config(format!("unknown report mode: {other}"))),
        }
    }
}

/// Upstream product locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedUrls {
    pub swepam: String,
    pub magnetometer: String,
    pub nowcast: String,
    pub planetary_kp: String,
    pub kp_forecast: String,
    pub cme_events: String,
}

impl Default for FeedUrls {
    fn default() -> Self {
        Self {
            swepam: "https://services.swpc.noaa.gov/text/ace-swepam.txt".to_string(),
            magnetometer: "https://services.swpc.noaa.gov/text/ace-magnetometer.txt".to_string(),
            nowcast: "https://services.swpc.noaa.gov/text/aurora-nowcast-hemi-power.txt"
                .to_string(),
            planetary_kp: "https://services.swpc.noaa.gov/json/planetary_k_index_1m.json"
                .to_string(),
            kp_forecast: "https://services.swpc.noaa.gov/text/3-day-forecast.txt".to_string(),
            cme_events: "https://kauai.ccmc.gsfc.nasa.gov/DONKI/WS/get/CME".to_string(),
        }
    }
}

/// Configuration for the monitor runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Seconds between pipeline cycles
    pub poll_interval_secs: u64,

    /// How long to keep polling; `None` runs until Ctrl+C
    pub observation_window_mins: Option<u64>,

    /// Alert recipients
    pub recipients: Vec<String>,

    /// Receives error notifications and the weekly heartbeat
    pub operator_recipient: String,

    pub report_mode: ReportMode,

    /// Upper bound on every feed request
    pub fetch_timeout_secs: u64,

    /// `UTC` or a fixed offset such as `+08:00`
    pub display_timezone: String,

    /// JSON webhook for deliveries; log-only when unset
    pub webhook_url: Option<String>,

    pub thresholds: Thresholds,

    pub feeds: FeedUrls,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            db_path: "aurora_data.db".to_string(),
            poll_interval_secs: 60,
            observation_window_mins: None,
            recipients: Vec::new(),
            operator_recipient: "operator@localhost".to_string(),
            report_mode: ReportMode::Silent,
            fetch_timeout_secs: 10,
            display_timezone: "UTC".to_string(),
            webhook_url: None,
            thresholds: Thresholds::default(),
            feeds: FeedUrls::default(),
        }
    }
}

/// Parse an optional environment variable; a set but unparseable value is an error.
fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MonitorError::Config(format!("{key}={raw:?} is not a valid value"))),
        Err(_) => Ok(None),
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `AURORA_DB_PATH` (default: aurora_data.db)
    /// - `AURORA_POLL_INTERVAL_SECS` (default: 60)
    /// - `AURORA_OBSERVATION_WINDOW_MINS` (default: unset, run until Ctrl+C)
    /// - `AURORA_RECIPIENTS` comma-separated (default: none)
    /// - `AURORA_OPERATOR` (default: operator@localhost)
    /// - `AURORA_REPORT_MODE` silent | strong (default: silent)
    /// - `AURORA_FETCH_TIMEOUT_SECS` (default: 10)
    /// - `AURORA_DISPLAY_TZ` (default: UTC)
    /// - `AURORA_WEBHOOK_URL` (default: unset)
    /// - `AURORA_KP_ELEVATED`, `AURORA_KP_SEVERE`, `AURORA_REALTIME_KP`,
    ///   `AURORA_BULK_SPEED_KMS`, `AURORA_NOWCAST_POWER_GW`,
    ///   `AURORA_PREDICTED_POWER_GW`, `AURORA_PROTON_DENSITY_PCC`,
    ///   `AURORA_ARRIVAL_WINDOW_SECS`
    ///
    /// A malformed value fails the whole load rather than defaulting one field.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let t = Thresholds::default();

        Ok(Self {
            db_path: env::var("AURORA_DB_PATH").unwrap_or(defaults.db_path),

            poll_interval_secs: env_parsed("AURORA_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.poll_interval_secs),

            observation_window_mins: env_parsed("AURORA_OBSERVATION_WINDOW_MINS")?,

            recipients: env::var("AURORA_RECIPIENTS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),

            operator_recipient: env::var("AURORA_OPERATOR")
                .unwrap_or(defaults.operator_recipient),

            report_mode: env_parsed("AURORA_REPORT_MODE")?.unwrap_or(defaults.report_mode),

            fetch_timeout_secs: env_parsed("AURORA_FETCH_TIMEOUT_SECS")?
                .unwrap_or(defaults.fetch_timeout_secs),

            display_timezone: env::var("AURORA_DISPLAY_TZ").unwrap_or(defaults.display_timezone),

            webhook_url: env::var("AURORA_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),

            thresholds: Thresholds {
                kp_elevated: env_parsed("AURORA_KP_ELEVATED")?.unwrap_or(t.kp_elevated),
                kp_severe: env_parsed("AURORA_KP_SEVERE")?.unwrap_or(t.kp_severe),
                realtime_kp: env_parsed("AURORA_REALTIME_KP")?.unwrap_or(t.realtime_kp),
                bulk_speed_kms: env_parsed("AURORA_BULK_SPEED_KMS")?.unwrap_or(t.bulk_speed_kms),
                nowcast_power_gw: env_parsed("AURORA_NOWCAST_POWER_GW")?
                    .unwrap_or(t.nowcast_power_gw),
                predicted_power_gw: env_parsed("AURORA_PREDICTED_POWER_GW")?
                    .unwrap_or(t.predicted_power_gw),
                proton_density_pcc: env_parsed("AURORA_PROTON_DENSITY_PCC")?
                    .unwrap_or(t.proton_density_pcc),
                arrival_window_secs: env_parsed("AURORA_ARRIVAL_WINDOW_SECS")?
                    .unwrap_or(t.arrival_window_secs),
            },

            feeds: defaults.feeds,
        })
    }

    /// Read a complete configuration from a JSON file and validate it.
    pub fn load_override(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.display())))?;
        let config: MonitorConfig = serde_json::from_str(&raw)
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.poll_interval_secs == 0 {
            return Err(MonitorError::Config(
                "poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(MonitorError::Config(
                "fetch_timeout_secs must be positive".to_string(),
            ));
        }
        super::query::parse_display_zone(&self.display_timezone)?;
        Ok(())
    }

    /// Environment config, replaced wholesale by `AURORA_CONFIG_FILE` when set.
    ///
    /// Any config error (bad override file, invalid environment values) falls
    /// back to compiled-in defaults with a warning.
    pub fn resolve() -> Self {
        let candidate = match env::var("AURORA_CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => match Self::load_override(&path) {
                Ok(config) => {
                    log::info!("📄 Loaded configuration override from {}", path);
                    return config;
                }
                Err(e) => {
                    log::warn!("⚠️  Ignoring configuration override: {}", e);
                    return Self::default();
                }
            },
            _ => match Self::from_env() {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("⚠️  Invalid environment configuration ({}), using defaults", e);
                    return Self::default();
                }
            },
        };

        match candidate.validate() {
            Ok(()) => candidate,
            Err(e) => {
                log::warn!("⚠️  Invalid environment configuration ({}), using defaults", e);
                Self::default()
            }
        }
    }
}
