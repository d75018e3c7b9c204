//! Read-only query surface over stored records
//!
//! Readers open their own connection in `query_only` mode so ad-hoc tools can
//! run next to the ingestion writer without taking write locks.

use super::db::{record_from_row, RECORD_COLUMNS};
use super::types::{LocalizedRecord, Record};
use crate::error::{MonitorError, Result};
use crate::sqlite_pragma::apply_optimized_pragmas;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Timezone used to stamp records and report times for humans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayZone {
    /// IANA zone; the offset follows daylight saving per instant
    Named(Tz),
    Fixed(FixedOffset),
}

impl DisplayZone {
    pub fn localize(&self, t: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            DisplayZone::Named(tz) => t.with_timezone(tz).fixed_offset(),
            DisplayZone::Fixed(offset) => t.with_timezone(offset),
        }
    }
}

/// Parse a display timezone: `UTC`, `Z`, `+08:00`, `-0530`, `+09` or an IANA
/// name such as `Asia/Shanghai`.
pub fn parse_display_zone(tz: &str) -> Result<DisplayZone> {
    let tz = tz.trim();
    if tz.is_empty()
        || tz.starts_with(['+', '-'])
        || tz.eq_ignore_ascii_case("utc")
        || tz.eq_ignore_ascii_case("z")
    {
        return parse_fixed_offset(tz).map(DisplayZone::Fixed);
    }
    tz.parse::<Tz>()
        .map(DisplayZone::Named)
        .map_err(|_| MonitorError::Config(format!("unsupported display timezone: {tz}")))
}

fn parse_fixed_offset(tz: &str) -> Result<FixedOffset> {
    let invalid = || MonitorError::Config(format!("unsupported display timezone: {tz}"));

    if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || rest.matches(':').count() > 1 {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| invalid())?,
            digits[2..].parse::<i32>().map_err(|_| invalid())?,
        ),
        _ => return Err(invalid()),
    };
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Read-only access to `space_weather_records`
pub struct RecordQuery {
    conn: Connection,
}

impl RecordQuery {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(MonitorError::Persistence(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let conn = Connection::open(path)?;
        apply_optimized_pragmas(&conn)?;
        // Must come after the pragmas above
        conn.execute_batch("PRAGMA query_only = ON")?;

        Ok(Self { conn })
    }

    /// Record whose forecast arrival time is closest to `target`.
    ///
    /// Records without a usable forecast (NULL, `nan`, unparseable) never
    /// match; ties go to the earliest observation.
    pub fn nearest(&self, target: DateTime<Utc>) -> Result<Option<Record>> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM space_weather_records
            WHERE forecast IS NOT NULL
              AND forecast != 'nan'
              AND strftime('%s', REPLACE(forecast, '_', ' ')) IS NOT NULL
            ORDER BY ABS(CAST(strftime('%s', REPLACE(forecast, '_', ' ')) AS INTEGER) - ?1) ASC,
                     observed_at ASC
            LIMIT 1
            "#
        );
        let record = self
            .conn
            .query_row(&sql, [target.timestamp()], record_from_row)
            .optional()?;
        Ok(record)
    }

    /// Records in `[from, to]`, newest first, stamped in `zone`.
    pub fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        zone: DisplayZone,
    ) -> Result<Vec<LocalizedRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM space_weather_records \
             WHERE observed_at BETWEEN ?1 AND ?2 \
             ORDER BY observed_at DESC"
        ))?;

        let rows = stmt.query_map(params![from.timestamp(), to.timestamp()], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            let record = row?;
            out.push(LocalizedRecord {
                display_time: zone.localize(record.timestamp),
                record,
            });
        }
        Ok(out)
    }

    /// Records from the hour before `now`.
    pub fn last_hour(&self, now: DateTime<Utc>, zone: DisplayZone) -> Result<Vec<LocalizedRecord>> {
        self.range(now - Duration::hours(1), now, zone)
    }

    /// Every stored record, oldest first.
    pub fn all(&self) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM space_weather_records ORDER BY observed_at ASC"
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::db::RecordStore;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn record(observed: DateTime<Utc>, forecast: Option<&str>) -> Record {
        let mut r = Record::empty(observed);
        r.forecast = forecast.map(str::to_string);
        r.north_power = Some(42.0);
        r
    }

    fn seeded(records: &[Record]) -> (NamedTempFile, RecordQuery) {
        let temp = NamedTempFile::new().unwrap();
        let store = RecordStore::open(temp.path()).unwrap();
        store.upsert_records(records, Utc::now()).unwrap();
        let query = RecordQuery::open(temp.path()).unwrap();
        (temp, query)
    }

    #[test]
    fn test_nearest_picks_closer_record() {
        let (_temp, query) = seeded(&[
            record(at(11, 58), Some("2024-03-01_11:58")),
            record(at(12, 1), Some("2024-03-01_12:01")),
        ]);

        let nearest = query.nearest(at(12, 0)).unwrap().unwrap();
        assert_eq!(nearest.timestamp, at(12, 1));
    }

    #[test]
    fn test_nearest_uses_forecast_arrival_and_skips_unusable() {
        let (_temp, query) = seeded(&[
            record(at(11, 0), Some("2024-03-01_11:45")),
            record(at(11, 1), Some("nan")),
            record(at(11, 2), None),
            record(at(11, 3), Some("garbage")),
            record(at(11, 4), Some("2024-03-01_11:49")),
        ]);

        let nearest = query.nearest(at(12, 0)).unwrap().unwrap();
        assert_eq!(nearest.timestamp, at(11, 4));
        assert_eq!(nearest.forecast.as_deref(), Some("2024-03-01_11:49"));
    }

    #[test]
    fn test_nearest_tie_goes_to_earliest() {
        let (_temp, query) = seeded(&[
            record(at(11, 20), Some("2024-03-01_12:05")),
            record(at(11, 10), Some("2024-03-01_11:55")),
        ]);

        let nearest = query.nearest(at(12, 0)).unwrap().unwrap();
        assert_eq!(nearest.timestamp, at(11, 10));
    }

    #[test]
    fn test_nearest_without_forecasts_is_none() {
        let (_temp, query) = seeded(&[record(at(11, 0), None), record(at(11, 1), Some("nan"))]);
        assert_eq!(query.nearest(at(12, 0)).unwrap(), None);
    }

    #[test]
    fn test_range_is_closed_descending_and_localized() {
        let records: Vec<Record> = (0..10).map(|m| record(at(12, m), None)).collect();
        let (_temp, query) = seeded(&records);
        let zone = parse_display_zone("+08:00").unwrap();

        let rows = query.range(at(12, 2), at(12, 5), zone).unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.record.timestamp).collect();
        assert_eq!(stamps, vec![at(12, 5), at(12, 4), at(12, 3), at(12, 2)]);

        assert_eq!(rows[0].display_time.to_rfc3339(), "2024-03-01T20:05:00+08:00");
        // stored UTC value is untouched
        assert_eq!(rows[0].record.timestamp, at(12, 5));
    }

    #[test]
    fn test_last_hour_and_all() {
        let records = vec![
            record(at(10, 30), None),
            record(at(11, 30), None),
            record(at(12, 0), None),
        ];
        let (_temp, query) = seeded(&records);
        let utc = parse_display_zone("UTC").unwrap();

        let last_hour = query.last_hour(at(12, 10), utc).unwrap();
        assert_eq!(last_hour.len(), 2);
        assert_eq!(last_hour[0].record.timestamp, at(12, 0));

        assert_eq!(query.all().unwrap(), records);
    }

    #[test]
    fn test_reader_cannot_write() {
        let (_temp, query) = seeded(&[record(at(12, 0), None)]);
        assert!(query
            .conn
            .execute("DELETE FROM space_weather_records", [])
            .is_err());
    }

    #[test]
    fn test_missing_database_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecordQuery::open(dir.path().join("absent.db"))
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parse_fixed_display_zones() {
        let offset = |tz: &str| match parse_display_zone(tz).unwrap() {
            DisplayZone::Fixed(offset) => offset.local_minus_utc(),
            DisplayZone::Named(tz) => panic!("expected fixed offset, got {tz}"),
        };
        assert_eq!(offset("UTC"), 0);
        assert_eq!(offset("+08:00"), 8 * 3600);
        assert_eq!(offset("-0530"), -(5 * 3600 + 30 * 60));
        assert_eq!(offset("+9"), 9 * 3600);
        assert!(parse_display_zone("+25:00").is_err());
        assert!(parse_display_zone("+08:0:0").is_err());
        assert!(parse_display_zone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn test_named_zone_localizes_records() {
        let zone = parse_display_zone("Asia/Shanghai").unwrap();
        assert_eq!(zone, DisplayZone::Named(chrono_tz::Asia::Shanghai));

        let (_temp, query) = seeded(&[record(at(12, 5), None)]);
        let rows = query.range(at(12, 0), at(12, 10), zone).unwrap();
        assert_eq!(rows[0].display_time.to_rfc3339(), "2024-03-01T20:05:00+08:00");
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() {
        let zone = parse_display_zone("America/New_York").unwrap();
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();

        assert_eq!(zone.localize(winter).to_rfc3339(), "2024-01-15T07:00:00-05:00");
        assert_eq!(zone.localize(summer).to_rfc3339(), "2024-07-15T08:00:00-04:00");
    }
}
