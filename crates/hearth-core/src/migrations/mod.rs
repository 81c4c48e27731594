//! Versioned SQL migrations discovered from a directory.
//!
//! A migration is a file named `NNN_slug.sql`, where `NNN` is a (usually
//! zero-padded) decimal version and `slug` uses `[A-Za-z0-9._-]`. Anything
//! else in the directory is ignored. Each pending migration runs in its own
//! transaction together with the insert of its history row, so a version is
//! either fully applied and recorded or not applied at all.
//!
//! The history is linear and one-way: there are no down migrations, and a
//! migration that has been applied anywhere sharing history with production
//! must never be edited in place. Nothing here enforces that; it is a
//! deployment rule.
//!
//! Scripts run inside the migration's transaction, so they must not contain
//! their own `BEGIN`/`COMMIT`, and pragmas that are no-ops inside a
//! transaction (such as `foreign_keys`) have no effect there.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use jiff::Timestamp;
use log::{debug, info, warn};
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::error::{Result, StoreError};

pub mod history;


pub use history::MigrationRecord;

/// File extension every migration carries.
pub const MIGRATION_SUFFIX: &str = ".sql";

// ASCII digits only; `\d` would also accept other Unicode digits.
static MIGRATION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)_([A-Za-z0-9._-]+)\.sql$").expect("migration filename pattern is valid")
});

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    /// Numeric version parsed from the filename prefix.
    pub version: u64,
    /// Descriptive slug following the version.
    pub name: String,
    /// The file name as found in the directory.
    pub filename: String,
    /// Full path, re-read when the migration is applied.
    pub path: PathBuf,
}

impl MigrationFile {
    /// Parses a file name against the migration pattern.
    ///
    /// Returns `None` for names that are not migrations, including version
    /// `0` and versions above `i64::MAX`.
    pub fn parse(dir: &Path, filename: &str) -> Option<Self> {
        let captures = MIGRATION_FILENAME.captures(filename)?;
        // History stores versions as SQLite INTEGER, so they must fit in i64.
        let version = captures[1]
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0 && i64::try_from(*v).is_ok())?;
        Some(Self {
            version,
            name: captures[2].to_string(),
            filename: filename.to_string(),
            path: dir.join(filename),
        })
    }

    fn failed(&self, source: rusqlite::Error) -> StoreError {
        StoreError::MigrationApply {
            version: self.version,
            filename: self.filename.clone(),
            source,
        }
    }
}

impl fmt::Display for MigrationFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}_{}", self.version, self.name)
    }
}

/// Outcome of a single [`run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MigrationReport {
    /// Migrations applied by this call. Earlier runs are never counted.
    pub applied: usize,
}

/// Applied history next to what is still waiting on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<MigrationFile>,
}

/// Lists the migrations in `migrations_dir`, sorted by ascending version.
///
/// Entries that do not match the filename pattern are skipped silently.
/// Duplicate versions are kept (ordered by file name); the history primary
/// key rejects the second one when it is applied.
///
/// # Errors
///
/// Returns `StoreError::FileSystem` if the directory cannot be read.
pub fn discover(migrations_dir: &Path) -> Result<Vec<MigrationFile>> {
    let entries =
        fs::read_dir(migrations_dir).map_err(|e| StoreError::file_system(migrations_dir, e))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::file_system(migrations_dir, e))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !file_name.ends_with(MIGRATION_SUFFIX) || !entry.path().is_file() {
            continue;
        }
        match MigrationFile::parse(migrations_dir, file_name) {
            Some(migration) => migrations.push(migration),
            None => debug!("Ignoring non-migration file {file_name}"),
        }
    }

    migrations.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(migrations)
}

/// Applies every pending migration in `migrations_dir` to `conn`.
///
/// Pending migrations run one at a time in ascending version order. The
/// first failure stops the run: the failing migration is rolled back, no
/// history row is written for it, and later migrations are not attempted.
/// Running again after fixing the cause resumes at the failed version.
///
/// # Errors
///
/// - `StoreError::Configuration` if `migrations_dir` does not exist
/// - `StoreError::MigrationApply` if a script or its history insert fails
/// - `StoreError::FileSystem` if a migration file cannot be read
/// - `StoreError::Connectivity` if the history table cannot be read
pub fn run(conn: &mut Connection, migrations_dir: &Path) -> Result<MigrationReport> {
    if !migrations_dir.is_dir() {
        return Err(StoreError::configuration(format!(
            "migrations dir not found: {}",
            migrations_dir.display()
        )));
    }

    history::ensure_table(conn)?;

    let discovered = discover(migrations_dir)?;
    warn_on_duplicate_versions(&discovered);

    let applied = history::applied_versions(conn)?;
    let pending: Vec<MigrationFile> = discovered
        .into_iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    if pending.is_empty() {
        info!("[migrate] no pending migrations");
        return Ok(MigrationReport::default());
    }

    let mut report = MigrationReport::default();
    for migration in &pending {
        info!("[migrate] applying {migration}");
        apply_one(conn, migration)?;
        report.applied += 1;
    }
    info!("[migrate] done. applied={}", report.applied);

    Ok(report)
}

/// Reports applied and pending migrations without changing anything.
///
/// Works against read-only connections and databases that have never been
/// migrated.
///
/// # Errors
///
/// Returns `StoreError::Configuration` if `migrations_dir` does not exist.
pub fn status(conn: &Connection, migrations_dir: &Path) -> Result<MigrationStatus> {
    if !migrations_dir.is_dir() {
        return Err(StoreError::configuration(format!(
            "migrations dir not found: {}",
            migrations_dir.display()
        )));
    }

    let applied = history::applied_migrations(conn)?;
    let pending = discover(migrations_dir)?
        .into_iter()
        .filter(|m| !applied.iter().any(|record| record.version == m.version))
        .collect();

    Ok(MigrationStatus { applied, pending })
}

fn apply_one(conn: &mut Connection, migration: &MigrationFile) -> Result<()> {
    let sql = fs::read_to_string(&migration.path)
        .map_err(|e| StoreError::file_system(&migration.path, e))?;

    // Dropping the transaction without commit rolls it back.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| migration.failed(e))?;
    tx.execute_batch(&sql).map_err(|e| migration.failed(e))?;
    history::record(&tx, migration, Timestamp::now()).map_err(|e| migration.failed(e))?;
    tx.commit().map_err(|e| migration.failed(e))?;

    Ok(())
}

fn warn_on_duplicate_versions(migrations: &[MigrationFile]) {
    let mut by_version: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
    for migration in migrations {
        by_version
            .entry(migration.version)
            .or_default()
            .push(&migration.filename);
    }
    for (version, files) in by_version.iter().filter(|(_, files)| files.len() > 1) {
        warn!(
            "[migrate] version {version} is claimed by {}; only the first can be recorded",
            files.join(", ")
        );
    }
}
