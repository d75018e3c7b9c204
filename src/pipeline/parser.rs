//! Feed parsing: raw text/JSON payloads → ordered typed rows
//!
//! Every feed is described by a declarative [`FeedSchema`]: expected columns,
//! comment markers, optional leading tokens, the time key and the bindings
//! from feed columns to [`Record`](super::types::Record) fields. All feed
//! parsing goes through [`parse`], so each schema is testable with literal
//! fixture text.
//!
//! The 3-day forecast grid has its own all-or-nothing rules and lives in
//! `forecast.rs`.

use super::types::{Cadence, CmeEvent, Column, MAG_FILL_CUTOFF, SWPC_FILL_CUTOFF};
use crate::error::{MonitorError, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Comment markers used by every SWPC text product.
pub const SWPC_COMMENT_MARKERS: &[&str] = &[":", "#"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Whitespace-separated table, one observation per line
    Table,
    /// JSON array of objects keyed by column name
    JsonRecords,
}

/// Where a row's timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKey {
    /// Separate year / month / day / HHMM columns (ACE tables)
    SplitDate {
        year: &'static str,
        month: &'static str,
        day: &'static str,
        hhmm: &'static str,
    },
    /// One column holding a chrono-formatted UTC stamp
    Stamp {
        column: &'static str,
        format: &'static str,
    },
}

#[derive(Debug)]
pub struct FeedSchema {
    pub name: &'static str,
    pub format: PayloadFormat,
    pub columns: &'static [&'static str],
    pub comment_markers: &'static [&'static str],
    /// When set, a data line must start with one of these tokens
    pub leading_tokens: Option<&'static [&'static str]>,
    pub time_key: TimeKey,
    pub bindings: &'static [(&'static str, Column)],
    /// Numeric readings at or below this are instrument fill values
    pub fill_cutoff: f64,
    pub cadence: Cadence,
}

const ACE_TIME_KEY: TimeKey = TimeKey::SplitDate {
    year: "Year",
    month: "Month",
    day: "Day",
    hhmm: "Time",
};

/// ACE real-time solar wind plasma (`ace-swepam.txt`)
pub static SWEPAM: FeedSchema = FeedSchema {
    name: "ace-swepam",
    format: PayloadFormat::Table,
    columns: &[
        "Year",
        "Month",
        "Day",
        "Time",
        "Modified Julian Day",
        "Seconds of Day",
        "Status",
        "Proton Density",
        "Bulk Speed",
        "Ion Temperature",
    ],
    comment_markers: SWPC_COMMENT_MARKERS,
    leading_tokens: None,
    time_key: ACE_TIME_KEY,
    bindings: &[
        ("Status", Column::SwepamStatus),
        ("Proton Density", Column::ProtonDensity),
        ("Bulk Speed", Column::BulkSpeed),
        ("Ion Temperature", Column::IonTemperature),
    ],
    fill_cutoff: SWPC_FILL_CUTOFF,
    cadence: Cadence::ONE_MINUTE,
};

/// ACE real-time interplanetary magnetic field (`ace-magnetometer.txt`)
pub static MAGNETOMETER: FeedSchema = FeedSchema {
    name: "ace-magnetometer",
    format: PayloadFormat::Table,
    columns: &[
        "Year",
        "Month",
        "Day",
        "Time",
        "Modified Julian Day",
        "Seconds of Day",
        "Status",
        "Bx",
        "By",
        "Bz",
        "Bt",
        "Latitude",
        "Longitude",
    ],
    comment_markers: SWPC_COMMENT_MARKERS,
    leading_tokens: None,
    time_key: ACE_TIME_KEY,
    bindings: &[
        ("Status", Column::MagStatus),
        ("Bx", Column::Bx),
        ("By", Column::By),
        ("Bz", Column::Bz),
        ("Bt", Column::Bt),
        ("Latitude", Column::Latitude),
        ("Longitude", Column::Longitude),
    ],
    fill_cutoff: MAG_FILL_CUTOFF,
    cadence: Cadence::ONE_MINUTE,
};

/// OVATION hemispheric power nowcast (`aurora-nowcast-hemi-power.txt`)
pub static NOWCAST: FeedSchema = FeedSchema {
    name: "aurora-nowcast",
    format: PayloadFormat::Table,
    columns: &[
        "Observation",
        "Forecast",
        "North-Hemispheric-Power-Index",
        "South-Hemispheric-Power-Index",
    ],
    comment_markers: SWPC_COMMENT_MARKERS,
    leading_tokens: None,
    time_key: TimeKey::Stamp {
        column: "Observation",
        format: "%Y-%m-%d_%H:%M",
    },
    bindings: &[
        ("Forecast", Column::Forecast),
        ("North-Hemispheric-Power-Index", Column::NorthPower),
        ("South-Hemispheric-Power-Index", Column::SouthPower),
    ],
    fill_cutoff: SWPC_FILL_CUTOFF,
    cadence: Cadence::FIVE_MINUTES,
};

/// Estimated planetary Kp, one value per minute (`planetary_k_index_1m.json`)
pub static PLANETARY_KP: FeedSchema = FeedSchema {
    name: "planetary-kp-1m",
    format: PayloadFormat::JsonRecords,
    columns: &["time_tag", "estimated_kp"],
    comment_markers: &[],
    leading_tokens: None,
    time_key: TimeKey::Stamp {
        column: "time_tag",
        format: "%Y-%m-%dT%H:%M:%S",
    },
    bindings: &[("estimated_kp", Column::RealtimeKp)],
    fill_cutoff: SWPC_FILL_CUTOFF,
    cadence: Cadence::ONE_MINUTE,
};

/// One accepted data line, tokens in schema column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: &'static [&'static str],
    tokens: Vec<String>,
}

impl Row {
    pub fn new(columns: &'static [&'static str], tokens: Vec<String>) -> Self {
        Self { columns, tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Token for a named column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .and_then(|idx| self.tokens.get(idx))
            .map(String::as_str)
    }

    /// Row timestamp truncated to the minute.
    pub fn timestamp(&self, key: &TimeKey) -> Option<DateTime<Utc>> {
        let naive = match key {
            TimeKey::SplitDate {
                year,
                month,
                day,
                hhmm,
            } => {
                let stamp = format!(
                    "{}-{}-{} {:0>4}",
                    self.get(year)?,
                    self.get(month)?,
                    self.get(day)?,
                    self.get(hhmm)?
                );
                NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H%M").ok()?
            }
            TimeKey::Stamp { column, format } => {
                NaiveDateTime::parse_from_str(self.get(column)?, format).ok()?
            }
        };

        naive
            .with_second(0)
            .and_then(|n| n.with_nanosecond(0))
            .map(|n| n.and_utc())
    }
}

/// Parse a raw payload with the given schema.
///
/// Rows with the wrong number of tokens are dropped. An empty payload or a
/// payload without a single accepted row is a format error, leaving the caller
/// to treat the feed as absent this cycle.
pub fn parse(raw: &str, schema: &'static FeedSchema) -> Result<Vec<Row>> {
    if raw.trim().is_empty() {
        return Err(MonitorError::format(schema.name, "empty payload"));
    }

    let rows = match schema.format {
        PayloadFormat::Table => parse_table(raw, schema),
        PayloadFormat::JsonRecords => parse_json_records(raw, schema)?,
    };

    if rows.is_empty() {
        return Err(MonitorError::format(schema.name, "no parseable rows"));
    }

    log::debug!("📥 {}: parsed {} rows", schema.name, rows.len());
    Ok(rows)
}

/// Lines that survive comment stripping (blank lines included).
pub fn strip_comments<'a>(
    raw: &'a str,
    markers: &'a [&'a str],
) -> impl Iterator<Item = &'a str> + 'a {
    raw.lines()
        .filter(move |line| !markers.iter().any(|m| line.starts_with(m)))
}

fn parse_table(raw: &str, schema: &'static FeedSchema) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for line in strip_comments(raw, schema.comment_markers) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        if let Some(leading) = schema.leading_tokens {
            if !leading.contains(&tokens[0]) {
                dropped += 1;
                continue;
            }
        }

        if tokens.len() != schema.columns.len() {
            dropped += 1;
            continue;
        }

        rows.push(Row::new(
            schema.columns,
            tokens.into_iter().map(str::to_string).collect(),
        ));
    }

    if dropped > 0 {
        log::debug!("{}: dropped {} non-data lines", schema.name, dropped);
    }
    rows
}

fn parse_json_records(raw: &str, schema: &'static FeedSchema) -> Result<Vec<Row>> {
    let payload: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| MonitorError::format(schema.name, format!("invalid JSON: {}", e)))?;

    let entries = payload
        .as_array()
        .ok_or_else(|| MonitorError::format(schema.name, "expected a JSON array"))?;

    let rows = entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let tokens = schema
                .columns
                .iter()
                .map(|column| match object.get(*column)? {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Option<Vec<String>>>()?;
            Some(Row::new(schema.columns, tokens))
        })
        .collect();

    Ok(rows)
}

const CME_FEED: &str = "cme-events";

/// Fields checked, in order, for an object's detection timestamp.
const CME_TIME_FIELDS: &[&str] = &["t0", "startTime", "time_tag", "activityID"];

fn iso_timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?")
            .expect("valid timestamp regex")
    })
}

/// Extract CME detections from the JSON event log.
///
/// Object entries yield one event each; plain-string entries (free-text log
/// lines) yield one event per embedded timestamp. Events are unique by `t0`.
/// An array without detections is valid and yields nothing.
pub fn parse_cme_events(raw: &str) -> Result<Vec<CmeEvent>> {
    if raw.trim().is_empty() {
        return Err(MonitorError::format(CME_FEED, "empty payload"));
    }

    let payload: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| MonitorError::format(CME_FEED, format!("invalid JSON: {}", e)))?;
    let entries = payload
        .as_array()
        .ok_or_else(|| MonitorError::format(CME_FEED, "expected a JSON array"))?;

    let re = iso_timestamp_regex();
    let mut seen = HashSet::new();
    let mut events = Vec::new();

    for entry in entries {
        match entry {
            serde_json::Value::String(text) => {
                for m in re.find_iter(text) {
                    if seen.insert(m.as_str().to_string()) {
                        events.push(CmeEvent {
                            t0: m.as_str().to_string(),
                            detail: text.clone(),
                        });
                    }
                }
            }
            serde_json::Value::Object(object) => {
                let detail = entry.to_string();
                let t0 = CME_TIME_FIELDS
                    .iter()
                    .filter_map(|field| object.get(*field).and_then(|v| v.as_str()))
                    .find_map(|value| re.find(value))
                    .or_else(|| re.find(&detail))
                    .map(|m| m.as_str().to_string());

                match t0 {
                    Some(t0) if seen.insert(t0.clone()) => events.push(CmeEvent { t0, detail }),
                    Some(_) => {}
                    None => log::debug!("{}: entry without timestamp skipped", CME_FEED),
                }
            }
            _ => {}
        }
    }

    Ok(events)
}
