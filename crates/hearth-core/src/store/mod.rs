//! Async facade over the [`ConnectionManager`].
//!
//! SQLite calls block for as long as the busy timeout allows, so every
//! [`Store`] method moves its work onto tokio's blocking pool. Route
//! handlers hold a cloned `Store` (an `Arc` inside) and never touch the
//! manager from the executor threads directly.
//!
//! ```no_run
//! use hearth_core::{StoreBuilder, StoreError};
//!
//! # async fn example() -> Result<(), StoreError> {
//! let store = StoreBuilder::new()
//!     .with_database_path(Some("data/app.sqlite3"))
//!     .with_migrations_dir("migrations")
//!     .build()
//!     .await?;
//!
//! let inserted = store
//!     .with_tx(|tx| {
//!         tx.execute("INSERT INTO users (email) VALUES (?1)", ["a@example.com"])
//!             .map_err(|e| StoreError::Connectivity {
//!                 message: "insert user".into(),
//!                 source: e,
//!             })
//!     })
//!     .await?;
//! assert_eq!(inserted, 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rusqlite::{Connection, Transaction};
use tokio::task;

use crate::{
    config::CheckpointMode,
    db::{ConnectionManager, PragmaReport},
    error::{Result, StoreError},
    migrations::{MigrationReport, MigrationStatus},
};

pub mod builder;

pub use builder::StoreBuilder;

/// Shared, cloneable access to the database for async code.
#[derive(Debug, Clone)]
pub struct Store {
    manager: Arc<ConnectionManager>,
}

impl Store {
    /// Wraps an existing manager.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// The underlying manager, for blocking callers.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Runs `f` against the manager on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ConnectionManager) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        task::spawn_blocking(move || f(&manager))
            .await
            .map_err(join_error)?
    }

    /// Liveness probe; see [`ConnectionManager::health`].
    pub async fn health(&self) -> bool {
        let manager = Arc::clone(&self.manager);
        task::spawn_blocking(move || manager.health())
            .await
            .unwrap_or(false)
    }

    /// Runs `f` against the open connection.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |manager| {
            let conn = manager.db()?;
            f(&conn)
        })
        .await
    }

    /// Async form of [`ConnectionManager::with_tx`]. The caller's error is
    /// returned unchanged after rollback.
    pub async fn with_tx<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        task::spawn_blocking(move || manager.with_tx(f))
            .await
            .map_err(|e| E::from(join_error(e)))?
    }

    /// Applies migrations added since the handle was opened.
    pub async fn migrate(&self) -> Result<MigrationReport> {
        self.blocking(|manager| manager.migrate()).await
    }

    /// Applied and pending migrations.
    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        self.blocking(|manager| manager.migration_status()).await
    }

    /// Effective pragma values of the open handle.
    pub async fn pragma_report(&self) -> Result<PragmaReport> {
        self.blocking(|manager| manager.pragma_report()).await
    }

    /// Checkpoints the write-ahead log.
    pub async fn checkpoint(&self, mode: CheckpointMode) -> Result<()> {
        self.blocking(move |manager| manager.checkpoint(mode)).await
    }

    /// Rebuilds the database file.
    pub async fn vacuum(&self) -> Result<()> {
        self.blocking(|manager| manager.vacuum()).await
    }

    /// Closes the handle. Clones of this store reopen it on next use.
    pub async fn close(&self) -> Result<()> {
        self.blocking(|manager| manager.close()).await
    }
}

fn join_error(e: task::JoinError) -> StoreError {
    StoreError::configuration(format!("Task join error: {e}"))
}
