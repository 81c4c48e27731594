//! Store configuration and the environment variables that feed it.
//!
//! Configuration is read once, when a [`StoreConfig`] is built. A
//! [`ConnectionManager`](crate::db::ConnectionManager) keeps the config it
//! was created with, so later environment changes only matter to a manager
//! built afterwards.

use std::{
    env,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::error::{Result, StoreError};

/// Environment variable overriding the database file path.
pub const ENV_DB_PATH: &str = "DB_PATH";
/// Environment variable overriding the busy timeout, in milliseconds.
pub const ENV_BUSY_TIMEOUT_MS: &str = "DB_BUSY_TIMEOUT_MS";
/// Environment variable overriding the `synchronous` pragma.
pub const ENV_SYNCHRONOUS: &str = "DB_SYNCHRONOUS";
/// Environment variable that opens the database read-only when set to `1`.
pub const ENV_READONLY: &str = "DB_READONLY";
/// Environment variable overriding the migrations directory.
pub const ENV_MIGRATIONS_DIR: &str = "DB_MIGRATIONS_DIR";

/// Default busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(8000);

/// Largest busy timeout SQLite accepts, in milliseconds.
pub const MAX_BUSY_TIMEOUT_MS: u64 = i32::MAX as u64;

/// SQLite `synchronous` durability levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SynchronousMode {
    Off,
    #[default]
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    /// Returns the pragma keyword for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
            SynchronousMode::Extra => "EXTRA",
        }
    }

    /// Maps the integer reported by `PRAGMA synchronous` back to a mode.
    pub fn from_pragma_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(SynchronousMode::Off),
            1 => Some(SynchronousMode::Normal),
            2 => Some(SynchronousMode::Full),
            3 => Some(SynchronousMode::Extra),
            _ => None,
        }
    }
}

impl fmt::Display for SynchronousMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynchronousMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim();
        match value.to_ascii_uppercase().as_str() {
            "OFF" | "0" => Ok(SynchronousMode::Off),
            "NORMAL" | "1" => Ok(SynchronousMode::Normal),
            "FULL" | "2" => Ok(SynchronousMode::Full),
            "EXTRA" | "3" => Ok(SynchronousMode::Extra),
            _ => Err(StoreError::configuration(format!(
                "invalid synchronous mode '{value}'; expected OFF, NORMAL, FULL or EXTRA"
            ))),
        }
    }
}

/// Modes accepted by `PRAGMA wal_checkpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointMode {
    Passive,
    #[default]
    Full,
    Restart,
    Truncate,
}

impl CheckpointMode {
    /// Returns the pragma argument for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointMode::Passive => "PASSIVE",
            CheckpointMode::Full => "FULL",
            CheckpointMode::Restart => "RESTART",
            CheckpointMode::Truncate => "TRUNCATE",
        }
    }
}

impl fmt::Display for CheckpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim();
        match value.to_ascii_uppercase().as_str() {
            "PASSIVE" => Ok(CheckpointMode::Passive),
            "FULL" => Ok(CheckpointMode::Full),
            "RESTART" => Ok(CheckpointMode::Restart),
            "TRUNCATE" => Ok(CheckpointMode::Truncate),
            _ => Err(StoreError::configuration(format!(
                "invalid checkpoint mode '{value}'; expected PASSIVE, FULL, RESTART or TRUNCATE"
            ))),
        }
    }
}

/// Everything needed to open and prepare the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file. Parent directories are created on open.
    pub database_path: PathBuf,
    /// Directory scanned for `NNN_name.sql` migration files.
    pub migrations_dir: PathBuf,
    /// Maximum wait for a lock held by another connection.
    pub busy_timeout: Duration,
    /// Durability level for the `synchronous` pragma.
    pub synchronous: SynchronousMode,
    /// Open without write access. Migrations are skipped.
    pub read_only: bool,
}

impl StoreConfig {
    /// Creates a config for the given database file with default settings.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Builds a config from the process environment, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if a variable holds a value that
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. `from_env` delegates
    /// here; tests use it to avoid touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = non_empty(lookup(ENV_DB_PATH)) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty(lookup(ENV_MIGRATIONS_DIR)) {
            config.migrations_dir = PathBuf::from(dir);
        }
        if let Some(ms) = non_empty(lookup(ENV_BUSY_TIMEOUT_MS)) {
            let millis = ms.trim().parse::<u64>().map_err(|e| {
                StoreError::configuration(format!("{ENV_BUSY_TIMEOUT_MS}='{ms}': {e}"))
            })?;
            if millis > MAX_BUSY_TIMEOUT_MS {
                return Err(StoreError::configuration(format!(
                    "{ENV_BUSY_TIMEOUT_MS}='{ms}' exceeds the maximum of {MAX_BUSY_TIMEOUT_MS} ms"
                )));
            }
            config.busy_timeout = Duration::from_millis(millis);
        }
        if let Some(mode) = non_empty(lookup(ENV_SYNCHRONOUS)) {
            config.synchronous = mode.parse()?;
        }
        if let Some(flag) = non_empty(lookup(ENV_READONLY)) {
            config.read_only = matches!(flag.trim(), "1" | "true" | "TRUE" | "yes");
        }

        Ok(config)
    }

    /// Default database location, `data/app.sqlite3` under the working
    /// directory.
    pub fn default_database_path() -> PathBuf {
        Path::new("data").join("app.sqlite3")
    }

    /// Default migrations directory, `migrations` under the working
    /// directory.
    pub fn default_migrations_dir() -> PathBuf {
        PathBuf::from("migrations")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: Self::default_database_path(),
            migrations_dir: Self::default_migrations_dir(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            synchronous: SynchronousMode::default(),
            read_only: false,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
