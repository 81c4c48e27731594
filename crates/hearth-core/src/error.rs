//! Error types for the storage core.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the storage core can surface.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid or missing configuration, including a missing migrations
    /// directory. Fatal at startup.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
    /// A migration script failed. Its schema changes and history row were
    /// rolled back and later migrations were not attempted.
    #[error("Migration {version} ({filename}) failed: {source}")]
    MigrationApply {
        version: u64,
        filename: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Beginning or committing a transaction failed
    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// `with_tx` was entered again from inside its own unit of work
    #[error("Nested transactions are not supported; use a savepoint on the active transaction")]
    NestedTransaction,
    /// The storage engine could not be opened, configured or queried.
    /// Lock waits that exceed the busy timeout land here as well.
    #[error("Database error: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a file system error for the given path.
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Returns the underlying SQLite error code, if any.
    pub fn sqlite_error_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            Self::MigrationApply { source, .. }
            | Self::Transaction { source, .. }
            | Self::Connectivity { source, .. } => source.sqlite_error_code(),
            _ => None,
        }
    }
}

/// Extension trait mapping `rusqlite` errors into connectivity errors with a
/// message.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;
}

/// Extension trait mapping `rusqlite` errors raised while beginning or
/// committing a transaction.
pub trait TransactionResultExt<T> {
    /// Map transaction boundary errors with a message.
    fn tx_context(self, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|source| StoreError::Connectivity {
            message: message.to_string(),
            source,
        })
    }
}

impl<T> TransactionResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn tx_context(self, message: &str) -> Result<T> {
        self.map_err(|source| StoreError::Transaction {
            message: message.to_string(),
            source,
        })
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;
