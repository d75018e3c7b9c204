//! auroraflow: space-weather monitoring
//!
//! Ingests NOAA SWPC telemetry and forecast products, aligns them into a
//! per-minute timeline stored in SQLite and delivers deduplicated aurora
//! alerts. See `pipeline` for the moving parts.

pub mod error;
pub mod pipeline;
pub mod sqlite_pragma;
