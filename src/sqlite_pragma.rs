//! Shared SQLite connection tuning
//!
//! Applied to every connection the crate opens so the ingestion writer and
//! ad-hoc query readers can share one database file.

use rusqlite::Connection;
use std::time::Duration;

/// How long a connection waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply a busy timeout, WAL journaling and NORMAL sync.
///
/// In-memory databases report `memory` as their journal mode; that is
/// accepted as-is.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("📊 SQLite journal_mode={}", mode);

    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}
