//! Command handlers for the operator CLI.
//!
//! Each handler opens its own [`Store`], does one thing, closes the handle,
//! and renders a short markdown summary.

use std::{fmt::Write as _, sync::Arc};

use anyhow::{bail, Context, Result};
use hearth_core::{
    migrations, CheckpointMode, ConnectionManager, MigrationStatus, Store, StoreBuilder,
    StoreConfig,
};
use log::debug;
use tokio::task;

use crate::renderer::TerminalRenderer;

pub struct Cli {
    config: StoreConfig,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(config: StoreConfig, renderer: TerminalRenderer) -> Self {
        Self { config, renderer }
    }

    /// Opens the database, which applies every pending migration.
    pub async fn migrate(&self) -> Result<()> {
        if self.config.read_only {
            bail!("Cannot apply migrations to a read-only database");
        }

        let (store, report) = StoreBuilder::from_config(self.config.clone())
            .build_with_report()
            .await
            .context("Failed to migrate database")?;
        store.close().await.context("Failed to close database")?;

        self.renderer.render(&format!(
            "# Migrations\n\nApplied {} migration(s) to {}\n",
            report.applied,
            self.config.database_path.display()
        ));
        Ok(())
    }

    /// Reports applied and pending migrations without applying anything.
    pub async fn status(&self, json: bool) -> Result<()> {
        let status = self.read_status().await?;

        if json {
            return self.renderer.render_json(&status);
        }

        let mut out = format!(
            "# Migrations\n\nDatabase: {}\n\n## Applied\n\n",
            self.config.database_path.display()
        );
        if status.applied.is_empty() {
            out.push_str("none\n");
        }
        for record in &status.applied {
            let _ = writeln!(
                out,
                "- {:03}_{} ({}) at {}",
                record.version, record.name, record.filename, record.applied_at
            );
        }
        out.push_str("\n## Pending\n\n");
        if status.pending.is_empty() {
            out.push_str("none\n");
        }
        for migration in &status.pending {
            let _ = writeln!(out, "- {migration} ({})", migration.filename);
        }

        self.renderer.render(&out);
        Ok(())
    }

    /// Probes the database through a read-only handle, so pending
    /// migrations are left alone and a missing file counts as unhealthy.
    pub async fn health(&self) -> Result<()> {
        let config = StoreConfig {
            read_only: true,
            ..self.config.clone()
        };
        let store = Store::new(Arc::new(ConnectionManager::new(config)));
        let healthy = store.health().await;
        store.close().await.context("Failed to close database")?;

        if !healthy {
            bail!(
                "Database at {} is unhealthy",
                self.config.database_path.display()
            );
        }
        self.renderer.render(&format!(
            "Database at {} is healthy\n",
            self.config.database_path.display()
        ));
        Ok(())
    }

    pub async fn checkpoint(&self, mode: CheckpointMode) -> Result<()> {
        let store = self.open().await?;
        store
            .checkpoint(mode)
            .await
            .with_context(|| format!("Checkpoint ({mode}) failed"))?;
        store.close().await.context("Failed to close database")?;

        self.renderer
            .render(&format!("Checkpoint ({mode}) complete\n"));
        Ok(())
    }

    pub async fn vacuum(&self) -> Result<()> {
        let store = self.open().await?;
        store.vacuum().await.context("Vacuum failed")?;
        store.close().await.context("Failed to close database")?;

        self.renderer.render("Vacuum complete\n");
        Ok(())
    }

    async fn open(&self) -> Result<Store> {
        StoreBuilder::from_config(self.config.clone())
            .build()
            .await
            .context("Failed to open database")
    }

    /// Reads status through a read-only handle so nothing gets migrated. A
    /// database that does not exist yet has every migration pending.
    async fn read_status(&self) -> Result<MigrationStatus> {
        if !self.config.database_path.exists() {
            debug!(
                "No database at {}, listing migrations only",
                self.config.database_path.display()
            );
            let dir = self.config.migrations_dir.clone();
            let pending = task::spawn_blocking(move || migrations::discover(&dir))
                .await
                .context("Task join error")?
                .context("Failed to list migrations")?;
            return Ok(MigrationStatus {
                applied: Vec::new(),
                pending,
            });
        }

        let config = StoreConfig {
            read_only: true,
            ..self.config.clone()
        };
        let store = Store::new(Arc::new(ConnectionManager::new(config)));
        let status = store
            .migration_status()
            .await
            .context("Failed to read migration status")?;
        store.close().await.context("Failed to close database")?;
        Ok(status)
    }
}
