#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use hearth_core::{ConnectionManager, StoreConfig};
use rusqlite::Connection;
use tempfile::TempDir;

/// A temporary directory holding a database file and a migrations folder.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub db_path: PathBuf,
    pub migrations_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("data").join("app.sqlite3");
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).expect("Failed to create migrations dir");
        Self {
            temp_dir,
            db_path,
            migrations_dir,
        }
    }

    pub fn write_migration(&self, name: &str, sql: &str) {
        fs::write(self.migrations_dir.join(name), sql).expect("Failed to write migration");
    }

    pub fn config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(&self.db_path);
        config.migrations_dir = self.migrations_dir.clone();
        config
    }

    pub fn manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.config())
    }

    /// A plain connection to the same file, bypassing the manager.
    pub fn raw_connection(&self) -> Connection {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create data dir");
        }
        Connection::open(&self.db_path).expect("Failed to open raw connection")
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )
    .expect("Failed to query sqlite_master")
}

pub fn history_versions(conn: &Connection) -> Vec<u64> {
    let mut stmt = conn
        .prepare("SELECT version FROM schema_migrations ORDER BY version")
        .expect("Failed to prepare history query");
    stmt.query_map([], |row| row.get::<_, i64>(0).map(|v| v as u64))
        .expect("Failed to query history")
        .collect::<Result<Vec<_>, _>>()
        .expect("Failed to read history")
}

pub fn schema_snapshot(conn: &Connection) -> Vec<(String, String)> {
    let mut stmt = conn
        .prepare("SELECT name, COALESCE(sql, '') FROM sqlite_master ORDER BY name")
        .expect("Failed to prepare schema query");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("Failed to query schema")
        .collect::<Result<Vec<_>, _>>()
        .expect("Failed to read schema")
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp path should be valid UTF-8")
}
