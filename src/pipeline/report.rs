//! Subject and body composition for every delivery the monitor makes

use super::forecast::{ForecastScan, UT_PERIODS};
use super::signals::{ArrivalSignal, RealtimeSignal};
use super::query::DisplayZone;
use super::types::{CmeEvent, Record};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Write;

pub const DASHBOARD_URL: &str = "https://www.swpc.noaa.gov/communities/aurora-dashboard-experimental";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub subject: String,
    pub body: String,
}

fn render_grid(scan: &ForecastScan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<9}{:>9}{:>9}{:>9}",
        "", scan.grid.dates[0], scan.grid.dates[1], scan.grid.dates[2]
    );
    for (period, row) in UT_PERIODS.iter().zip(scan.grid.values.iter()) {
        let _ = writeln!(
            out,
            "{:<9}{:>9.2}{:>9.2}{:>9.2}",
            period, row[0], row[1], row[2]
        );
    }
    out
}

fn render_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Forecast alert for newly flagged days. `None` when nothing is flagged.
pub fn forecast_alert(scan: &ForecastScan, new_dates: &[NaiveDate], severe: bool) -> Option<Report> {
    if new_dates.is_empty() {
        return None;
    }

    let subject = if severe {
        "[Urgent Aurora Report] A remarkable aurora might happen in the next 3 days"
    } else {
        "[Aurora Report] A kp5+ forecast has been detected for the next days"
    };

    let mut body = format!("for more information check: {DASHBOARD_URL}\n\n");
    let _ = writeln!(body, "Dates of interest: {}", render_dates(new_dates));
    let _ = writeln!(body, "Highest forecast Kp: {:.2}\n", scan.grid.max());
    body.push_str(&render_grid(scan));

    Some(Report {
        subject: subject.to_string(),
        body,
    })
}

/// Numbered CME alert; `ordinal` counts today's CMEs including this one.
pub fn cme_alert(event: &CmeEvent, ordinal: usize) -> Report {
    Report {
        subject: format!("Halo CME Alert: New Event Detected ({ordinal} Today)"),
        body: format!(
            "A new Halo CME has been detected today.\n\n\
             First detection (t0): {}\n\n\
             Event details:\n{}\n\n---\n\
             This is CME number {} today.\n",
            event.t0, event.detail, ordinal
        ),
    }
}

pub fn realtime_alert(signal: &RealtimeSignal, zone: DisplayZone) -> Report {
    let name = signal.signal_type.as_str();
    let unit = signal.signal_type.unit();
    Report {
        subject: format!(
            "[Aurora Alert] Real-time {name} at {:.2}{unit} (threshold {:.2}{unit})",
            signal.value, signal.threshold
        ),
        body: format!(
            "Real-time {name} reached {:.2}{unit} at {}.\n\n\
             for more information check: {DASHBOARD_URL}\n",
            signal.value,
            zone.localize(signal.observed_at).format("%Y-%m-%d %H:%M %:z")
        ),
    }
}

pub fn arrival_alert(signal: &ArrivalSignal, zone: DisplayZone) -> Report {
    let arrival = zone.localize(signal.arrival).format("%Y-%m-%d %H:%M %:z");
    Report {
        subject: format!(
            "[Aurora Alert] Aurora predicted to arrive at {arrival} ({:.0} GW)",
            signal.north_power
        ),
        body: format!(
            "The nowcast issued at {} predicts northern hemispheric power of {:.0} GW \
             arriving at {arrival}.\n\n{}\n\nfor more information check: {DASHBOARD_URL}\n",
            zone.localize(signal.record.timestamp).format("%Y-%m-%d %H:%M %:z"),
            signal.north_power,
            render_record(&signal.record),
        ),
    }
}

pub fn heartbeat_report() -> Report {
    Report {
        subject: "[Script Report] Aurora monitoring script is running".to_string(),
        body: "This is a weekly report to confirm that the aurora monitoring script is \
               running correctly, but no significant kp5+ forecast has been detected in \
               the past week."
            .to_string(),
    }
}

/// Operator notification for a failed stage.
pub fn error_report(stage: &str, error: &str) -> Report {
    Report {
        subject: "Aurora forecast script has encountered an error".to_string(),
        body: format!("An error occurred during the {stage}: {error}"),
    }
}

/// Per-cycle status summary (strong report mode).
pub fn status_summary(
    now: DateTime<Utc>,
    zone: DisplayZone,
    latest: Option<&Record>,
    feeds_ok: usize,
    feeds_total: usize,
    new_records: usize,
) -> Report {
    let stamp = zone.localize(now).format("%Y-%m-%d %H:%M %:z");
    let mut body = format!(
        "Cycle at {stamp}: {feeds_ok}/{feeds_total} feeds available, {new_records} new records.\n\n"
    );
    match latest {
        Some(record) => body.push_str(&render_record(record)),
        None => body.push_str("No aligned data this cycle.\n"),
    }

    Report {
        subject: format!("[Aurora Status] Monitoring cycle {stamp}"),
        body,
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

/// Multi-line dump of one aligned minute.
pub fn render_record(r: &Record) -> String {
    format!(
        "observed_at: {}\n\
         realtime_kp: {}\n\
         bulk_speed: {} km/s\n\
         proton_density: {} p/cc\n\
         bz: {} nT (bt {} nT)\n\
         north_power: {} GW, south_power: {} GW\n\
         forecast: {}\n",
        r.timestamp.format("%Y-%m-%d %H:%M UTC"),
        fmt_opt(r.realtime_kp),
        fmt_opt(r.bulk_speed),
        fmt_opt(r.proton_density),
        fmt_opt(r.bz),
        fmt_opt(r.bt),
        fmt_opt(r.north_power),
        fmt_opt(r.south_power),
        r.forecast.as_deref().unwrap_or("n/a"),
    )
}
