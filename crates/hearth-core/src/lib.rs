//! Storage core for the Hearth API.
//!
//! This crate owns everything between the HTTP layer and SQLite: the single
//! database handle, its pragmas, versioned SQL migrations and their
//! history, scoped transactions, and housekeeping.
//!
//! # Layout
//!
//! - [`migrations`]: discovers `NNN_name.sql` files and applies pending ones,
//!   each in its own transaction, recording them in `schema_migrations`
//! - [`db`]: [`ConnectionManager`], the owner of the handle, with
//!   `init`/`db`/`with_tx`/`health`/`checkpoint`/`vacuum`/`close`
//! - [`store`]: [`Store`], the async facade that runs the manager on tokio's
//!   blocking pool
//! - [`config`]: [`StoreConfig`] and its `DB_*` environment variables
//! - [`lifecycle`]: shutdown signal for hosts that close on termination
//!
//! # Quick Start
//!
//! ```no_run
//! use hearth_core::{ConnectionManager, StoreConfig};
//!
//! # fn example() -> Result<(), hearth_core::StoreError> {
//! let mut config = StoreConfig::new("data/app.sqlite3");
//! config.migrations_dir = "migrations".into();
//!
//! let manager = ConnectionManager::new(config);
//! let report = manager.init()?;
//! println!("applied {} migration(s)", report.applied);
//!
//! assert!(manager.health());
//! manager.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod migrations;
pub mod store;

// Re-export commonly used types
pub use config::{CheckpointMode, StoreConfig, SynchronousMode};
pub use db::{ConnectionManager, DbGuard, PragmaReport};
pub use error::{Result, StoreError};
pub use migrations::{MigrationFile, MigrationRecord, MigrationReport, MigrationStatus};
pub use store::{Store, StoreBuilder};
