//! Liveness probing and storage housekeeping.

use log::{debug, info, warn};

use super::ConnectionManager;
use crate::{
    config::CheckpointMode,
    error::{DatabaseResultExt, Result},
};

impl ConnectionManager {
    /// Round-trips `SELECT 1`, opening the handle first if needed.
    ///
    /// Never fails: any error is logged and reported as `false`.
    pub fn health(&self) -> bool {
        let result = self.db().and_then(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .db_context("Health check query failed")
        });

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {e}");
                false
            }
        }
    }

    /// Folds the write-ahead log back into the main database file.
    pub fn checkpoint(&self, mode: CheckpointMode) -> Result<()> {
        let conn = self.db()?;
        let (busy, log_frames, checkpointed): (i64, i64, i64) = conn
            .query_row(&format!("PRAGMA wal_checkpoint({mode})"), [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .db_context("Failed to checkpoint database")?;

        debug!(
            "wal_checkpoint({mode}): busy={busy} log={log_frames} checkpointed={checkpointed}"
        );
        Ok(())
    }

    /// Rebuilds the database file to reclaim free pages.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.db()?;
        conn.execute_batch("VACUUM")
            .db_context("Failed to vacuum database")?;
        info!("Vacuumed database at {}", self.path().display());
        Ok(())
    }
}
