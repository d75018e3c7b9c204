//! 3-day Kp forecast grid scanner
//!
//! Parses the "NOAA Kp index breakdown" block of the SWPC 3-day forecast into
//! an 8×3 matrix, maps the year-less column labels to calendar dates and flags
//! threshold crossings. The grid is all-or-nothing: any structural problem
//! fails the whole scan with `MonitorError::KpForecast`.

use super::config::Thresholds;
use crate::error::{MonitorError, Result};
use chrono::{Datelike, Month, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

pub const SECTION_START: &str = "NOAA Kp index breakdown";
pub const SECTION_END: &str = "B. NOAA Solar Radiation";

/// Fixed 3-hour UT periods, in grid row order.
pub const UT_PERIODS: [&str; 8] = [
    "00-03UT", "03-06UT", "06-09UT", "09-12UT", "12-15UT", "15-18UT", "18-21UT", "21-00UT",
];

fn numeric_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid numeric token regex"))
}

fn label_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid separator regex"))
}

/// Validated 8×3 Kp matrix. `values[period][day]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastGrid {
    /// Year-less column labels as published ("Mar 01"), D-day first
    pub dates: [String; 3],
    pub values: [[f64; 3]; 8],
}

impl ForecastGrid {
    pub fn column(&self, day: usize) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().map(move |row| row[day])
    }

    pub fn max(&self) -> f64 {
        self.values
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Outcome of scanning one forecast product.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastScan {
    pub grid: ForecastGrid,
    pub column_elevated: [bool; 3],
    pub column_severe: [bool; 3],
    /// Calendar dates of every elevated column, D-day included
    pub interesting_dates: Vec<NaiveDate>,
    /// Calendar dates of every severe column
    pub severe_dates: Vec<NaiveDate>,
    pub elevated: bool,
    pub severe: bool,
}

fn forecast_error(reason: impl Into<String>) -> MonitorError {
    MonitorError::KpForecast(reason.into())
}

/// Scan the forecast text against the Kp thresholds.
///
/// `evaluation_date` is the UTC date the product is evaluated on; it drives
/// year completion of the column labels.
pub fn scan(text: &str, thresholds: &Thresholds, evaluation_date: NaiveDate) -> Result<ForecastScan> {
    let section = locate_section(text)?;
    let first_date = header_first_date(section)?;
    let dates = date_labels(section, &first_date)?;
    let values = period_rows(section)?;
    let grid = ForecastGrid { dates, values };

    let mut column_elevated = [false; 3];
    let mut column_severe = [false; 3];
    for day in 0..3 {
        column_elevated[day] = grid.column(day).any(|kp| kp >= thresholds.kp_elevated);
        column_severe[day] = grid.column(day).any(|kp| kp >= thresholds.kp_severe);
    }

    let mut interesting_dates = Vec::new();
    let mut severe_dates = Vec::new();
    for day in 0..3 {
        if !column_elevated[day] && !column_severe[day] {
            continue;
        }
        let date = complete_year(&grid.dates[day], evaluation_date)?;
        if column_elevated[day] {
            interesting_dates.push(date);
        }
        if column_severe[day] {
            severe_dates.push(date);
        }
    }

    let scan = ForecastScan {
        elevated: column_elevated.iter().any(|f| *f),
        severe: column_severe.iter().any(|f| *f),
        grid,
        column_elevated,
        column_severe,
        interesting_dates,
        severe_dates,
    };

    log::debug!(
        "🔭 Forecast {:?}: max Kp {:.2}, elevated={}, severe={}",
        scan.grid.dates,
        scan.grid.max(),
        scan.elevated,
        scan.severe
    );
    Ok(scan)
}

fn locate_section(text: &str) -> Result<&str> {
    let start = text
        .find(SECTION_START)
        .ok_or_else(|| forecast_error("Kp index breakdown section not found"))?;
    let rest = &text[start..];
    let end = rest
        .find(SECTION_END)
        .ok_or_else(|| forecast_error("end of Kp index breakdown section not found"))?;
    Ok(&rest[..end])
}

/// First date token of "NOAA Kp index breakdown Mar 01-Mar 03 2024".
fn header_first_date(section: &str) -> Result<String> {
    let header = section
        .lines()
        .next()
        .and_then(|line| line.strip_prefix(SECTION_START))
        .map(str::trim)
        .filter(|dates| !dates.is_empty())
        .ok_or_else(|| forecast_error("forecast date header not found"))?;

    let first = header.split('-').next().unwrap_or_default().trim();
    if first.is_empty() {
        return Err(forecast_error(format!("unreadable date header: {header}")));
    }
    Ok(first.to_string())
}

fn date_labels(section: &str, first_date: &str) -> Result<[String; 3]> {
    let line = section
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| line.starts_with(first_date))
        .ok_or_else(|| forecast_error(format!("no date line starting with {first_date}")))?;

    let labels: Vec<&str> = label_separator().split(line).collect();
    match labels.as_slice() {
        [d0, d1, d2] => Ok([d0.to_string(), d1.to_string(), d2.to_string()]),
        _ => Err(forecast_error(format!(
            "expected 3 date labels, found {}: {line}",
            labels.len()
        ))),
    }
}

fn period_rows(section: &str) -> Result<[[f64; 3]; 8]> {
    let mut rows: [Option<[f64; 3]>; 8] = [None; 8];

    for line in section.lines() {
        let raw_parts: Vec<&str> = line.split_whitespace().collect();
        let Some(period) = raw_parts
            .first()
            .and_then(|label| UT_PERIODS.iter().position(|p| p == label))
        else {
            continue;
        };

        let parts: Vec<&str> = raw_parts[1..]
            .iter()
            .copied()
            .filter(|token| numeric_token().is_match(token))
            .collect();
        if parts.len() != 3 {
            return Err(forecast_error(format!(
                "failed to capture exactly 3 values for {}: raw {:?}, filtered {:?}",
                UT_PERIODS[period], raw_parts, parts
            )));
        }

        if rows[period].is_some() {
            return Err(forecast_error(format!(
                "duplicate forecast row for {}",
                UT_PERIODS[period]
            )));
        }

        let mut values = [0.0; 3];
        for (slot, token) in values.iter_mut().zip(&parts) {
            *slot = token
                .parse::<f64>()
                .map_err(|e| forecast_error(format!("bad Kp value {token}: {e}")))?;
        }
        rows[period] = Some(values);
    }

    let mut grid = [[0.0; 3]; 8];
    for (period, row) in rows.iter().enumerate() {
        grid[period] = row.ok_or_else(|| {
            forecast_error(format!("missing forecast row for {}", UT_PERIODS[period]))
        })?;
    }
    Ok(grid)
}

/// Complete a year-less "Mon DD" label relative to the evaluation date.
///
/// A January label seen in December belongs to the next year; everything else
/// belongs to the evaluation year.
pub fn complete_year(label: &str, evaluation_date: NaiveDate) -> Result<NaiveDate> {
    let mut parts = label.split_whitespace();
    let (Some(month_token), Some(day_token), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(forecast_error(format!("date label is not 'Mon DD': {label}")));
    };

    let month: Month = month_token
        .parse()
        .map_err(|_| forecast_error(format!("unknown month in date label: {label}")))?;
    let day: u32 = day_token
        .parse()
        .map_err(|_| forecast_error(format!("bad day in date label: {label}")))?;

    let year = if evaluation_date.month() == 12 && month == Month::January {
        evaluation_date.year() + 1
    } else {
        evaluation_date.year()
    };

    NaiveDate::from_ymd_opt(year, month.number_from_month(), day)
        .ok_or_else(|| forecast_error(format!("invalid calendar date {label} {year}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn product(dates_header: &str, date_line: &str, rows: &[&str]) -> String {
        format!(
            ":Product: 3-Day Forecast
:Issued: 2025 Jan 20 0030 UTC
#
A. NOAA Geomagnetic Activity Observation and Forecast

The greatest observed 3 hr Kp over the past 24 hours was 2 (below NOAA
Scale levels).

{SECTION_START} {dates_header}

{date_line}
{}

Rationale: No G1 (Minor) or greater geomagnetic storms are expected.

B. NOAA Solar Radiation Activity Observation and Forecast
",
            rows.join("\n")
        )
    }

    fn rows_with_column(day: usize, column: [f64; 8], background: f64) -> Vec<String> {
        UT_PERIODS
            .iter()
            .zip(column)
            .map(|(period, v)| {
                let mut values = [background; 3];
                values[day] = v;
                format!(
                    "{period}       {:.2}         {:.2}         {:.2}",
                    values[0], values[1], values[2]
                )
            })
            .collect()
    }

    fn jan_product(rows: &[String]) -> String {
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        product(
            "Jan 20-Jan 22 2025",
            "             Jan 20       Jan 21       Jan 22",
            &refs,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_elevated_middle_column() {
        let rows = rows_with_column(1, [3.0, 4.0, 5.0, 6.0, 4.0, 3.0, 2.0, 5.0], 2.0);
        let scan = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap();

        assert_eq!(scan.grid.dates, ["Jan 20", "Jan 21", "Jan 22"]);
        assert_eq!(scan.column_elevated, [false, true, false]);
        assert!(scan.elevated);
        assert!(!scan.severe);
        assert_eq!(scan.interesting_dates, vec![date(2025, 1, 21)]);
        assert!(scan.severe_dates.is_empty());
        assert_eq!(scan.grid.values[3], [2.0, 6.0, 2.0]);
    }

    #[test]
    fn test_boundary_values_trigger() {
        let rows = rows_with_column(0, [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 5.0], 1.0);
        let scan = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap();
        assert_eq!(scan.column_elevated, [true, false, false]);
        assert!(!scan.severe);

        let rows = rows_with_column(2, [1.0, 6.67, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 1.0);
        let scan = super::scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap();
        assert_eq!(scan.column_severe, [false, false, true]);
        assert!(scan.severe);
        assert_eq!(scan.severe_dates, vec![date(2025, 1, 22)]);
        assert_eq!(scan.interesting_dates, vec![date(2025, 1, 22)]);
    }

    #[test]
    fn test_quiet_forecast() {
        let rows = rows_with_column(0, [2.0; 8], 2.33);
        let scan = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap();
        assert!(!scan.elevated);
        assert!(!scan.severe);
        assert!(scan.interesting_dates.is_empty());
    }

    #[test]
    fn test_storm_annotation_is_filtered() {
        let mut rows = rows_with_column(0, [2.0; 8], 2.0);
        rows[7] = "21-00UT       5.00 (G1)    3.00         2.67".to_string();
        let scan = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap();
        assert_eq!(scan.grid.values[7], [5.0, 3.0, 2.67]);
        assert_eq!(scan.interesting_dates, vec![date(2025, 1, 20)]);
    }

    #[test]
    fn test_wrong_numeric_token_count_is_fatal() {
        for bad_row in [
            "03-06UT       n/a          n/a          n/a",
            "03-06UT       2.00",
            "03-06UT       2.00         3.00",
            "03-06UT       2.00         3.00         4.00         5.00",
        ] {
            let mut rows = rows_with_column(0, [2.0; 8], 2.0);
            rows[1] = bad_row.to_string();
            let err = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::KpForecast, "row: {bad_row}");
        }
    }

    #[test]
    fn test_missing_or_duplicate_period_is_fatal() {
        let mut rows = rows_with_column(0, [2.0; 8], 2.0);
        rows.remove(4);
        let err = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap_err();
        assert!(err.to_string().contains("12-15UT"));

        let mut rows = rows_with_column(0, [2.0; 8], 2.0);
        rows[4] = rows[3].clone();
        let err = scan(&jan_product(&rows), &Thresholds::default(), date(2025, 1, 20)).unwrap_err();
        assert!(err.to_string().contains("09-12UT"));
    }

    #[test]
    fn test_missing_anchors_are_fatal() {
        let err = scan("no forecast here", &Thresholds::default(), date(2025, 1, 20)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KpForecast);

        let rows = rows_with_column(0, [2.0; 8], 2.0);
        let truncated = jan_product(&rows).replace(SECTION_END, "");
        assert!(scan(&truncated, &Thresholds::default(), date(2025, 1, 20)).is_err());
    }

    #[test]
    fn test_date_line_needs_three_labels() {
        let rows = rows_with_column(0, [2.0; 8], 2.0);
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let text = product("Jan 20-Jan 22 2025", "   Jan 20       Jan 21", &refs);
        assert!(scan(&text, &Thresholds::default(), date(2025, 1, 20)).is_err());
    }

    #[test]
    fn test_year_rollover_from_december() {
        let rows = rows_with_column(2, [6.0; 8], 2.0);
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let text = product(
            "Dec 30-Jan 01 2025",
            "             Dec 30       Dec 31       Jan 01",
            &refs,
        );
        let scan = scan(&text, &Thresholds::default(), date(2024, 12, 30)).unwrap();
        assert_eq!(scan.interesting_dates, vec![date(2025, 1, 1)]);
    }

    #[test]
    fn test_complete_year() {
        assert_eq!(
            complete_year("Jan 5", date(2024, 12, 20)).unwrap(),
            date(2025, 1, 5)
        );
        assert_eq!(
            complete_year("Jul 4", date(2024, 6, 10)).unwrap(),
            date(2024, 7, 4)
        );
        assert_eq!(
            complete_year("Dec 31", date(2024, 12, 20)).unwrap(),
            date(2024, 12, 31)
        );
        assert!(complete_year("Feb 29", date(2025, 2, 1)).is_err());
        assert!(complete_year("Foo 12", date(2025, 2, 1)).is_err());
    }

    #[test]
    fn test_unflagged_labels_are_not_completed() {
        // Feb 29 in 2025 is not a date, but the column never crosses a threshold
        let rows = rows_with_column(0, [6.0; 8], 1.0);
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let text = product(
            "Feb 28-Mar 02 2025",
            "             Feb 28       Feb 29       Mar 01",
            &refs,
        );
        let scan = scan(&text, &Thresholds::default(), date(2025, 2, 28)).unwrap();
        assert_eq!(scan.interesting_dates, vec![date(2025, 2, 28)]);

        let rows = rows_with_column(1, [6.0; 8], 1.0);
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let text = product(
            "Feb 28-Mar 02 2025",
            "             Feb 28       Feb 29       Mar 01",
            &refs,
        );
        assert!(super::scan(&text, &Thresholds::default(), date(2025, 2, 28)).is_err());
    }
}
