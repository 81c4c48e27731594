//! Ownership of the single SQLite handle.
//!
//! [`ConnectionManager`] is built once at process start and shared by
//! reference (usually inside an `Arc`). It opens the database lazily or on
//! [`ConnectionManager::init`], applies the connection pragmas, runs pending
//! migrations on writable handles, and hands the connection out through
//! [`DbGuard`] and [`ConnectionManager::with_tx`]. No other component opens
//! or closes the handle.
//!
//! Access is serialized by a mutex inside the manager; waits on locks held by
//! other processes are bounded by the configured busy timeout. All methods
//! block, so async callers should go through [`Store`](crate::store::Store).

use std::{
    fs,
    ops::{Deref, DerefMut},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
    time::Instant,
};

use log::{debug, info};
use rusqlite::{Connection, OpenFlags};

use crate::{
    config::StoreConfig,
    error::{DatabaseResultExt, Result, StoreError},
    migrations::{self, MigrationReport, MigrationStatus},
};

mod maintenance;
mod pragmas;
mod transaction;

pub use pragmas::PragmaReport;

/// Owner of the process-wide database handle.
#[derive(Debug)]
pub struct ConnectionManager {
    config: StoreConfig,
    handle: Mutex<Option<Connection>>,
    holder: Mutex<Option<ThreadId>>,
}

impl ConnectionManager {
    /// Creates a manager for `config`. Nothing is opened until first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            handle: Mutex::new(None),
            holder: Mutex::new(None),
        }
    }

    /// Opens the handle, applies pragmas and, unless read-only, runs pending
    /// migrations.
    ///
    /// Calling this on an open manager does nothing and reports zero applied
    /// migrations. If any step fails the handle is dropped and the manager
    /// stays closed, so the process must not start serving.
    ///
    /// # Errors
    ///
    /// - `StoreError::FileSystem` if the parent directory cannot be created
    /// - `StoreError::Connectivity` if the database cannot be opened or configured
    /// - `StoreError::Configuration` if the migrations directory is missing
    /// - `StoreError::MigrationApply` if a migration fails
    pub fn init(&self) -> Result<MigrationReport> {
        let mut lock = self.lock_handle()?;
        if lock.is_some() {
            debug!("Database already initialized at {}", self.path().display());
            return Ok(MigrationReport::default());
        }

        let (connection, report) = self.open()?;
        *lock.guard = Some(connection);
        Ok(report)
    }

    /// Returns the open handle, initializing it first if needed.
    ///
    /// The guard holds the manager's lock. Drop it before calling other
    /// manager methods from the same thread; re-entrant calls fail with
    /// `StoreError::NestedTransaction` instead of deadlocking.
    pub fn db(&self) -> Result<DbGuard<'_>> {
        let lock = self.lock_open()?;
        Ok(DbGuard { lock })
    }

    /// Runs pending migrations against the open handle.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` for read-only handles, otherwise
    /// whatever [`migrations::run`] returns.
    pub fn migrate(&self) -> Result<MigrationReport> {
        if self.config.read_only {
            return Err(StoreError::configuration(
                "cannot run migrations on a read-only database",
            ));
        }
        let mut conn = self.db()?;
        migrations::run(&mut conn, &self.config.migrations_dir)
    }

    /// Reports applied and pending migrations.
    pub fn migration_status(&self) -> Result<MigrationStatus> {
        let conn = self.db()?;
        migrations::status(&conn, &self.config.migrations_dir)
    }

    /// Reads the effective pragma values back from the open handle.
    pub fn pragma_report(&self) -> Result<PragmaReport> {
        let conn = self.db()?;
        PragmaReport::read(&conn)
    }

    /// Closes the handle and returns the manager to its uninitialized state.
    ///
    /// A later [`init`](Self::init) or [`db`](Self::db) opens a fresh
    /// handle, re-reading nothing but this manager's config. Closing a closed
    /// manager is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connectivity` if SQLite refuses to close cleanly.
    /// The manager is reset either way.
    pub fn close(&self) -> Result<()> {
        let mut lock = self.lock_handle()?;
        let Some(connection) = lock.guard.take() else {
            return Ok(());
        };

        info!("Closing database at {}", self.path().display());
        connection
            .close()
            .map_err(|(_connection, e)| e)
            .db_context("Failed to close database")
    }

    /// The configuration this manager opens with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.config.database_path
    }

    /// Whether the handle is opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Whether a handle is currently open.
    pub fn is_open(&self) -> bool {
        match self.lock_handle() {
            Ok(lock) => lock.is_some(),
            // Only the thread currently using the handle gets here.
            Err(_) => true,
        }
    }

    fn open(&self) -> Result<(Connection, MigrationReport)> {
        let started_at = Instant::now();
        let path = self.path();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::file_system(parent, e))?;
        }

        let flags = if self.config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        let mut connection = Connection::open_with_flags(path, flags)
            .db_context("Failed to open database connection")?;

        pragmas::apply(&connection, &self.config)?;

        let report = if self.config.read_only {
            info!("Read-only database; skipping migrations");
            MigrationReport::default()
        } else {
            migrations::run(&mut connection, &self.config.migrations_dir)?
        };

        info!(
            "Database ready at {} (read_only={}, applied={}, {} ms)",
            path.display(),
            self.config.read_only,
            report.applied,
            started_at.elapsed().as_millis()
        );
        Ok((connection, report))
    }

    /// Takes the handle lock and opens the database if it is closed.
    fn lock_open(&self) -> Result<HandleLock<'_>> {
        let mut lock = self.lock_handle()?;
        if lock.guard.is_none() {
            let (connection, _) = self.open()?;
            *lock.guard = Some(connection);
        }
        Ok(lock)
    }

    /// Takes the handle lock, refusing re-entry from the thread that
    /// already holds it.
    fn lock_handle(&self) -> Result<HandleLock<'_>> {
        let current = thread::current().id();
        if *self.holder.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            return Err(StoreError::NestedTransaction);
        }

        // A panic inside a unit of work rolls its transaction back on unwind,
        // so a poisoned handle is still consistent.
        let guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
        Ok(HandleLock {
            guard,
            holder: &self.holder,
        })
    }
}

struct HandleLock<'a> {
    guard: MutexGuard<'a, Option<Connection>>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl HandleLock<'_> {
    fn is_some(&self) -> bool {
        self.guard.is_some()
    }

    fn connection(&self) -> &Connection {
        match self.guard.as_ref() {
            Some(connection) => connection,
            None => unreachable!("handle lock used after the connection was taken"),
        }
    }

    fn connection_mut(&mut self) -> &mut Connection {
        match self.guard.as_mut() {
            Some(connection) => connection,
            None => unreachable!("handle lock used after the connection was taken"),
        }
    }
}

impl Drop for HandleLock<'_> {
    fn drop(&mut self) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Borrowed access to the open connection.
///
/// Dereferences to [`rusqlite::Connection`], so prepared statements with
/// bound parameters work as usual. The guard cannot outlive the manager, and
/// `close()` waits for it to be dropped.
pub struct DbGuard<'a> {
    lock: HandleLock<'a>,
}

impl Deref for DbGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.lock.connection()
    }
}

impl DerefMut for DbGuard<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.lock.connection_mut()
    }
}
