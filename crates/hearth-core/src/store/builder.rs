//! Builder for creating and configuring Store instances.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::info;
use tokio::task;

use super::Store;
use crate::{
    config::{StoreConfig, SynchronousMode},
    db::ConnectionManager,
    error::{Result, StoreError},
    migrations::MigrationReport,
};

/// Builder for creating and configuring Store instances.
#[derive(Debug, Clone, Default)]
pub struct StoreBuilder {
    config: StoreConfig,
}

impl StoreBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Starts from the `DB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if a variable is malformed.
    pub fn from_env() -> Result<Self> {
        StoreConfig::from_env().map(Self::from_config)
    }

    /// Sets a custom database file path.
    ///
    /// If not specified, uses `data/app.sqlite3` under the working directory.
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.config.database_path = path.as_ref().to_path_buf();
        }
        self
    }

    /// Sets the directory scanned for migrations.
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.migrations_dir = dir.into();
        self
    }

    /// Sets the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout = timeout;
        self
    }

    /// Sets the `synchronous` pragma.
    pub fn with_synchronous(mut self, mode: SynchronousMode) -> Self {
        self.config.synchronous = mode;
        self
    }

    /// Opens the database read-only and skips migrations.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// The configuration the store will be built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens the database and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns whatever [`ConnectionManager::init`] returns. On error no
    /// handle is left open and the caller must not start serving.
    pub async fn build(self) -> Result<Store> {
        self.build_with_report().await.map(|(store, _)| store)
    }

    /// Like [`build`](Self::build), also reporting how many migrations the
    /// initial open applied.
    pub async fn build_with_report(self) -> Result<(Store, MigrationReport)> {
        let manager = Arc::new(ConnectionManager::new(self.config));

        let init_manager = Arc::clone(&manager);
        let report = task::spawn_blocking(move || init_manager.init())
            .await
            .map_err(|e| StoreError::Configuration {
                message: format!("Task join error: {e}"),
            })??;

        info!(
            "Store ready at {} ({} migration(s) applied)",
            manager.path().display(),
            report.applied
        );
        Ok((Store::new(manager), report))
    }
}
