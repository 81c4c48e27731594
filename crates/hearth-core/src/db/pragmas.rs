//! Connection pragmas applied on open, and reading them back.

use log::{debug, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    config::{StoreConfig, SynchronousMode, MAX_BUSY_TIMEOUT_MS},
    error::{DatabaseResultExt, Result, StoreError},
};

/// Applies the connection configuration in a fixed order: WAL journaling,
/// foreign keys, busy timeout, synchronous mode.
///
/// Read-only handles cannot switch journal mode and keep whatever the file
/// already uses.
pub(crate) fn apply(conn: &Connection, config: &StoreConfig) -> Result<()> {
    if config.read_only {
        debug!("Read-only database; leaving journal_mode unchanged");
    } else {
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .db_context("Failed to enable WAL journaling")?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!("journal_mode is '{mode}'; WAL is not available for this database");
        }
    }

    conn.execute_batch("PRAGMA foreign_keys = ON")
        .db_context("Failed to enable foreign keys")?;
    // rusqlite panics on timeouts that do not fit in an i32 of milliseconds.
    if config.busy_timeout.as_millis() > u128::from(MAX_BUSY_TIMEOUT_MS) {
        return Err(StoreError::configuration(format!(
            "busy timeout of {} ms exceeds the maximum of {MAX_BUSY_TIMEOUT_MS} ms",
            config.busy_timeout.as_millis()
        )));
    }
    conn.busy_timeout(config.busy_timeout)
        .db_context("Failed to set busy timeout")?;
    conn.execute_batch(&format!("PRAGMA synchronous = {}", config.synchronous))
        .db_context("Failed to set synchronous mode")?;

    debug!(
        "Applied pragmas: foreign_keys=ON busy_timeout={}ms synchronous={}",
        config.busy_timeout.as_millis(),
        config.synchronous
    );
    Ok(())
}

/// Pragma values as reported by a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PragmaReport {
    /// Lower-cased journal mode, `wal` on writable file databases.
    pub journal_mode: String,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
    pub synchronous: SynchronousMode,
}

impl PragmaReport {
    /// Queries the current pragma values from `conn`.
    pub fn read(conn: &Connection) -> Result<Self> {
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .db_context("Failed to read journal_mode")?;
        let foreign_keys: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .db_context("Failed to read foreign_keys")?;
        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .db_context("Failed to read busy_timeout")?;
        let synchronous: i64 = conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .db_context("Failed to read synchronous")?;

        let synchronous = SynchronousMode::from_pragma_value(synchronous).ok_or_else(|| {
            StoreError::configuration(format!("unknown synchronous value {synchronous}"))
        })?;

        Ok(Self {
            journal_mode: journal_mode.to_ascii_lowercase(),
            foreign_keys: foreign_keys == 1,
            busy_timeout_ms: busy_timeout.max(0) as u64,
            synchronous,
        })
    }

    /// Whether write-ahead logging is active.
    pub fn is_wal(&self) -> bool {
        self.journal_mode == "wal"
    }
}
