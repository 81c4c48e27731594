//! The `schema_migrations` table: one append-only row per applied version.

use std::collections::BTreeSet;

use jiff::Timestamp;
use rusqlite::{params, types::Type, Connection, Transaction};
use serde::Serialize;

use super::MigrationFile;
use crate::error::{DatabaseResultExt, Result};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    filename    TEXT NOT NULL,
    applied_at  INTEGER NOT NULL
)";
const TABLE_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')";
const SELECT_VERSIONS_SQL: &str = "SELECT version FROM schema_migrations";
const SELECT_RECORDS_SQL: &str =
    "SELECT version, name, filename, applied_at FROM schema_migrations ORDER BY version";
const INSERT_RECORD_SQL: &str =
    "INSERT INTO schema_migrations (version, name, filename, applied_at) VALUES (?1, ?2, ?3, ?4)";

/// A persisted history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub version: u64,
    pub name: String,
    pub filename: String,
    pub applied_at: Timestamp,
}

/// Creates the history table if it does not exist yet.
pub fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLE_SQL)
        .db_context("Failed to create schema_migrations table")
}

fn table_exists(conn: &Connection) -> Result<bool> {
    conn.query_row(TABLE_EXISTS_SQL, [], |row| row.get(0))
        .db_context("Failed to look up schema_migrations table")
}

/// Versions already recorded. Empty if the table does not exist.
pub(crate) fn applied_versions(conn: &Connection) -> Result<BTreeSet<u64>> {
    if !table_exists(conn)? {
        return Ok(BTreeSet::new());
    }

    let mut stmt = conn
        .prepare(SELECT_VERSIONS_SQL)
        .db_context("Failed to prepare applied versions query")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, i64>(0).map(|v| v as u64))
        .db_context("Failed to query applied versions")?
        .collect::<std::result::Result<BTreeSet<_>, _>>()
        .db_context("Failed to fetch applied versions")?;
    Ok(versions)
}

/// All history rows ordered by version. Empty if the table does not exist.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<MigrationRecord>> {
    if !table_exists(conn)? {
        return Ok(Vec::new());
    }

    let mut stmt = conn
        .prepare(SELECT_RECORDS_SQL)
        .db_context("Failed to prepare migration history query")?;
    let records = stmt
        .query_map([], |row| {
            let applied_at = row.get::<_, i64>(3)?;
            Ok(MigrationRecord {
                version: row.get::<_, i64>(0)? as u64,
                name: row.get(1)?,
                filename: row.get(2)?,
                applied_at: Timestamp::from_second(applied_at).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e))
                })?,
            })
        })
        .db_context("Failed to query migration history")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .db_context("Failed to fetch migration history")?;
    Ok(records)
}

/// Inserts the history row for `migration` inside the caller's transaction.
///
/// A version already present violates the primary key and fails here.
pub(crate) fn record(
    tx: &Transaction<'_>,
    migration: &MigrationFile,
    applied_at: Timestamp,
) -> rusqlite::Result<()> {
    tx.execute(
        INSERT_RECORD_SQL,
        params![
            migration.version as i64,
            migration.name,
            migration.filename,
            applied_at.as_second()
        ],
    )?;
    Ok(())
}
