//! Core data types shared across the pipeline
//!
//! `Record` mirrors the `space_weather_records` table in `sql/01_space_weather_records.sql`.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Fill cutoff for SWPC products whose fill values are -9999.9 / -1.00e+05.
pub const SWPC_FILL_CUTOFF: f64 = -9999.0;

/// Fill cutoff for the ACE magnetometer, which marks missing data as -999.9.
pub const MAG_FILL_CUTOFF: f64 = -999.0;

/// Sampling interval of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cadence {
    minutes: u32,
}

impl Cadence {
    pub const ONE_MINUTE: Cadence = Cadence { minutes: 1 };
    pub const FIVE_MINUTES: Cadence = Cadence { minutes: 5 };
    pub const DAILY: Cadence = Cadence { minutes: 24 * 60 };

    pub const fn minutes(minutes: u32) -> Self {
        Cadence { minutes }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.minutes as i64)
    }
}

/// A `Record` field that a feed column can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    ProtonDensity,
    BulkSpeed,
    IonTemperature,
    Bx,
    By,
    Bz,
    Bt,
    Latitude,
    Longitude,
    Forecast,
    NorthPower,
    SouthPower,
    RealtimeKp,
    SwepamStatus,
    MagStatus,
}

/// How a raw token for a column is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
    Status,
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Forecast => ColumnKind::Text,
            Column::SwepamStatus | Column::MagStatus => ColumnKind::Status,
            _ => ColumnKind::Numeric,
        }
    }

    /// Convert a raw token; `None` means "no observation" (fill value, `nan`, garbage).
    ///
    /// Numeric values at or below `fill_cutoff` are the feed's fill values.
    pub fn interpret(&self, token: &str, fill_cutoff: f64) -> Option<Value> {
        let token = token.trim();
        match self.kind() {
            ColumnKind::Numeric => token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > fill_cutoff)
                .map(Value::Number),
            ColumnKind::Status => token.parse::<i64>().ok().map(Value::Status),
            ColumnKind::Text => {
                if token.is_empty() || token.eq_ignore_ascii_case("nan") {
                    None
                } else {
                    Some(Value::Text(token.to_string()))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Status(i64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Status(v) => Some(*v as f64),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Status(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One canonical minute of aligned space-weather data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub proton_density: Option<f64>,
    pub bulk_speed: Option<f64>,
    pub ion_temperature: Option<f64>,
    pub bx: Option<f64>,
    pub by: Option<f64>,
    pub bz: Option<f64>,
    pub bt: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Predicted arrival time as published by the nowcast (`YYYY-MM-DD_HH:MM`)
    pub forecast: Option<String>,
    pub north_power: Option<f64>,
    pub south_power: Option<f64>,
    pub realtime_kp: Option<f64>,
    pub swepam_status: Option<i64>,
    pub mag_status: Option<i64>,
}

impl Record {
    /// Empty record for a minute; every field null.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            proton_density: None,
            bulk_speed: None,
            ion_temperature: None,
            bx: None,
            by: None,
            bz: None,
            bt: None,
            latitude: None,
            longitude: None,
            forecast: None,
            north_power: None,
            south_power: None,
            realtime_kp: None,
            swepam_status: None,
            mag_status: None,
        }
    }

    /// Write a single column value into the matching field.
    pub fn set(&mut self, column: Column, value: &Value) {
        match column {
            Column::ProtonDensity => self.proton_density = value.as_f64(),
            Column::BulkSpeed => self.bulk_speed = value.as_f64(),
            Column::IonTemperature => self.ion_temperature = value.as_f64(),
            Column::Bx => self.bx = value.as_f64(),
            Column::By => self.by = value.as_f64(),
            Column::Bz => self.bz = value.as_f64(),
            Column::Bt => self.bt = value.as_f64(),
            Column::Latitude => self.latitude = value.as_f64(),
            Column::Longitude => self.longitude = value.as_f64(),
            Column::Forecast => self.forecast = value.as_text().map(str::to_string),
            Column::NorthPower => self.north_power = value.as_f64(),
            Column::SouthPower => self.south_power = value.as_f64(),
            Column::RealtimeKp => self.realtime_kp = value.as_f64(),
            Column::SwepamStatus => self.swepam_status = value.as_i64(),
            Column::MagStatus => self.mag_status = value.as_i64(),
        }
    }

    /// Parsed forecast arrival time, if present and well-formed.
    pub fn forecast_time(&self) -> Option<DateTime<Utc>> {
        self.forecast.as_deref().and_then(parse_feed_stamp)
    }
}

/// Parse the nowcast stamp format `YYYY-MM-DD_HH:MM` as UTC.
pub fn parse_feed_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(stamp.trim(), "%Y-%m-%d_%H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A stored record paired with its timestamp rendered in a display timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedRecord {
    pub record: Record,
    pub display_time: DateTime<FixedOffset>,
}

/// A coronal mass ejection detection extracted from the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmeEvent {
    /// First-detection timestamp as it appears in the feed (ISO-8601)
    pub t0: String,
    /// Full text of the entry the timestamp was found in
    pub detail: String,
}
