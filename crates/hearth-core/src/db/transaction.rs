//! Scoped transactions on the managed handle.

use log::warn;
use rusqlite::Transaction;

use super::ConnectionManager;
use crate::error::{StoreError, TransactionResultExt};

impl ConnectionManager {
    /// Runs `f` inside a transaction on the managed handle.
    ///
    /// Commits when `f` returns `Ok`. When `f` returns `Err` the transaction
    /// is rolled back and that same error is returned untouched. A panic in
    /// `f` also rolls back, when the transaction is dropped during unwind.
    ///
    /// Calling `with_tx` (or [`db`](Self::db)) again from inside `f` fails
    /// with `StoreError::NestedTransaction`. For a nested atomic unit, open a
    /// savepoint on the transaction `f` receives.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or a `StoreError` converted into `E` when the
    /// handle cannot be opened or the transaction cannot begin or commit.
    pub fn with_tx<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut lock = self.lock_open()?;
        let tx = lock
            .connection_mut()
            .transaction()
            .tx_context("Failed to begin transaction")?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().tx_context("Failed to commit transaction")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback after failed unit of work also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}
