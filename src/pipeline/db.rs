//! SQLite record store
//!
//! Owns the `space_weather_records` and `kp_forecasts` tables. All writes are
//! `INSERT OR IGNORE` inside a single transaction, so re-ingesting a payload
//! after a partial failure never duplicates or rewrites a row.

use super::forecast::{ForecastGrid, UT_PERIODS};
use super::types::Record;
use crate::error::{MonitorError, Result};
use crate::sqlite_pragma::apply_optimized_pragmas;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Schema files, applied in order. Every statement uses `IF NOT EXISTS`.
pub const SCHEMA_FILES: &[(&str, &str)] = &[
    (
        "01_space_weather_records.sql",
        include_str!("../../sql/01_space_weather_records.sql"),
    ),
    (
        "02_sent_alerts.sql",
        include_str!("../../sql/02_sent_alerts.sql"),
    ),
    (
        "03_kp_forecasts.sql",
        include_str!("../../sql/03_kp_forecasts.sql"),
    ),
];

/// Column list shared by every `space_weather_records` reader.
pub const RECORD_COLUMNS: &str = "observed_at, proton_density, bulk_speed, ion_temperature, \
     bx_nt, by_nt, bz_nt, bt_nt, latitude, longitude, forecast, north_power, south_power, \
     realtime_kp, swepam_status, mag_status";

/// Run the embedded schema. Idempotent.
pub fn run_schema_migrations(conn: &Connection) -> Result<()> {
    log::debug!("🔧 Running schema migrations");
    for (name, sql) in SCHEMA_FILES {
        conn.execute_batch(sql)
            .map_err(|e| MonitorError::Persistence(format!("{name}: {e}")))?;
        log::debug!("   ├─ ✅ {}", name);
    }
    Ok(())
}

/// Open a writable connection with pragmas and schema applied.
pub fn open_writer(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())?;
    apply_optimized_pragmas(&conn)?;
    run_schema_migrations(&conn)?;
    Ok(conn)
}

/// Map a `RECORD_COLUMNS` row back into a `Record`.
pub fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let observed_at: i64 = row.get(0)?;
    let timestamp = DateTime::<Utc>::from_timestamp(observed_at, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, observed_at))?;

    Ok(Record {
        timestamp,
        proton_density: row.get(1)?,
        bulk_speed: row.get(2)?,
        ion_temperature: row.get(3)?,
        bx: row.get(4)?,
        by: row.get(5)?,
        bz: row.get(6)?,
        bt: row.get(7)?,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        forecast: row.get(10)?,
        north_power: row.get(11)?,
        south_power: row.get(12)?,
        realtime_kp: row.get(13)?,
        swepam_status: row.get(14)?,
        mag_status: row.get(15)?,
    })
}

/// Writer for aligned records and forecast grids
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = open_writer(path)?;
        log::info!("📊 Record store ready: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MonitorError::Persistence("record store lock poisoned".to_string()))
    }

    /// Insert records whose minute is not stored yet.
    ///
    /// Returns the number of new rows. Existing minutes are left untouched.
    pub fn upsert_records(&self, records: &[Record], now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO space_weather_records (
                    observed_at, proton_density, bulk_speed, ion_temperature,
                    bx_nt, by_nt, bz_nt, bt_nt, latitude, longitude,
                    forecast, north_power, south_power, realtime_kp,
                    swepam_status, mag_status, ingested_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;

            for r in records {
                inserted += stmt.execute(params![
                    r.timestamp.timestamp(),
                    r.proton_density,
                    r.bulk_speed,
                    r.ion_temperature,
                    r.bx,
                    r.by,
                    r.bz,
                    r.bt,
                    r.latitude,
                    r.longitude,
                    r.forecast,
                    r.north_power,
                    r.south_power,
                    r.realtime_kp,
                    r.swepam_status,
                    r.mag_status,
                    now.timestamp(),
                ])?;
            }
        }
        tx.commit()?;

        log::debug!(
            "💾 Upserted {} records ({} new)",
            records.len(),
            inserted
        );
        Ok(inserted)
    }

    /// Persist a validated forecast grid under its evaluation date.
    pub fn upsert_forecast_grid(
        &self,
        evaluation_date: NaiveDate,
        grid: &ForecastGrid,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO kp_forecasts (
                    evaluation_date, period,
                    d0_label, d0_kp, d1_label, d1_kp, d2_label, d2_kp,
                    recorded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;

            let date = evaluation_date.format("%Y-%m-%d").to_string();
            for (period, values) in UT_PERIODS.iter().zip(grid.values.iter()) {
                inserted += stmt.execute(params![
                    date,
                    period,
                    grid.dates[0],
                    values[0],
                    grid.dates[1],
                    values[1],
                    grid.dates[2],
                    values[2],
                    now.timestamp(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Most recent stored minute.
    pub fn latest(&self) -> Result<Option<Record>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM space_weather_records \
                     ORDER BY observed_at DESC LIMIT 1"
                ),
                [],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn record_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM space_weather_records", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    pub fn forecast_row_count(&self, evaluation_date: NaiveDate) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kp_forecasts WHERE evaluation_date = ?",
            [evaluation_date.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::NamedTempFile;

    fn create_test_store() -> (NamedTempFile, RecordStore) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = RecordStore::open(temp_file.path()).unwrap();
        (temp_file, store)
    }

    fn record_at(minute: u32, speed: f64) -> Record {
        let mut r = Record::empty(Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap());
        r.bulk_speed = Some(speed);
        r.forecast = Some(format!("2024-03-01_12:{:02}", minute + 45));
        r.swepam_status = Some(0);
        r
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let (_temp, store) = create_test_store();
        let now = Utc::now();
        let batch: Vec<Record> = (0..5).map(|m| record_at(m, 400.0 + m as f64)).collect();

        assert_eq!(store.upsert_records(&batch, now).unwrap(), 5);
        assert_eq!(store.upsert_records(&batch, now).unwrap(), 0);
        assert_eq!(store.record_count().unwrap(), 5);
    }

    #[test]
    fn test_existing_rows_are_not_rewritten() {
        let (_temp, store) = create_test_store();
        let now = Utc::now();

        store.upsert_records(&[record_at(0, 400.0)], now).unwrap();
        let overlapping = [record_at(0, 999.0), record_at(1, 401.0)];
        assert_eq!(store.upsert_records(&overlapping, now).unwrap(), 1);

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.timestamp.timestamp() - record_at(0, 0.0).timestamp.timestamp(), 60);

        let conn = store.lock().unwrap();
        let speed: f64 = conn
            .query_row(
                "SELECT bulk_speed FROM space_weather_records WHERE observed_at = ?",
                [record_at(0, 0.0).timestamp.timestamp()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(speed, 400.0);
    }

    #[test]
    fn test_round_trip_preserves_nulls() {
        let (_temp, store) = create_test_store();
        let mut record = Record::empty(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        record.bz = Some(-7.5);
        record.mag_status = Some(1);

        store.upsert_records(&[record.clone()], Utc::now()).unwrap();
        assert_eq!(store.latest().unwrap(), Some(record));
    }

    #[test]
    fn test_forecast_grid_upsert_is_idempotent() {
        let (_temp, store) = create_test_store();
        let grid = ForecastGrid {
            dates: ["Mar 01".into(), "Mar 02".into(), "Mar 03".into()],
            values: [[2.0, 3.0, 5.33]; 8],
        };
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let now = Utc::now();

        assert_eq!(store.upsert_forecast_grid(day, &grid, now).unwrap(), 8);
        assert_eq!(
            store
                .upsert_forecast_grid(day, &grid, now + Duration::hours(1))
                .unwrap(),
            0
        );
        assert_eq!(store.forecast_row_count(day).unwrap(), 8);
    }

    #[test]
    fn test_empty_store_has_no_latest() {
        let (_temp, store) = create_test_store();
        assert_eq!(store.latest().unwrap(), None);
        assert_eq!(store.upsert_records(&[], Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_migrations_are_repeatable() {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = open_writer(temp_file.path()).unwrap();
        run_schema_migrations(&conn).unwrap();
        run_schema_migrations(&conn).unwrap();
    }
}
