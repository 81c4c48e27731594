mod common;

use std::{sync::Arc, thread, time::Duration};

use common::{history_versions, table_exists, TestEnv};
use hearth_core::{CheckpointMode, ConnectionManager, StoreError, SynchronousMode};
use thiserror::Error;

/// Error type a route handler might use for its units of work.
#[derive(Debug, Error)]
enum UnitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error("rejected: {0}")]
    Rejected(String),
}

fn notes_env() -> TestEnv {
    let env = TestEnv::new();
    env.write_migration(
        "001_notes.sql",
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
    );
    env
}

fn note_count(manager: &ConnectionManager) -> i64 {
    let conn = manager.db().expect("Failed to get connection");
    conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
        .expect("Failed to count notes")
}

#[test]
fn test_init_applies_pragmas_and_migrations() {
    let env = TestEnv::new();
    env.write_migration("001_init.sql", "CREATE TABLE x(id INTEGER PRIMARY KEY);");
    let manager = env.manager();

    let report = manager.init().expect("Failed to initialize");
    assert_eq!(report.applied, 1);

    let pragmas = manager.pragma_report().expect("Failed to read pragmas");
    assert!(pragmas.is_wal());
    assert!(pragmas.foreign_keys);
    assert_eq!(pragmas.busy_timeout_ms, 8000);
    assert_eq!(pragmas.synchronous, SynchronousMode::Normal);

    let conn = manager.db().expect("Failed to get connection");
    assert!(table_exists(&conn, "x"));
}

#[test]
fn test_init_creates_parent_directories() {
    let env = notes_env();
    assert!(!env.db_path.parent().expect("db path has parent").exists());

    env.manager().init().expect("Failed to initialize");

    assert!(env.db_path.exists());
}

#[test]
fn test_custom_busy_timeout_and_synchronous() {
    let env = notes_env();
    let mut config = env.config();
    config.busy_timeout = Duration::from_millis(250);
    config.synchronous = SynchronousMode::Full;
    let manager = ConnectionManager::new(config);

    manager.init().expect("Failed to initialize");

    let pragmas = manager.pragma_report().expect("Failed to read pragmas");
    assert_eq!(pragmas.busy_timeout_ms, 250);
    assert_eq!(pragmas.synchronous, SynchronousMode::Full);
}

#[test]
fn test_second_init_is_noop() {
    let env = notes_env();
    let manager = env.manager();

    assert_eq!(manager.init().expect("First init failed").applied, 1);
    env.write_migration(
        "002_tags.sql",
        "CREATE TABLE tags (id INTEGER PRIMARY KEY);",
    );
    assert_eq!(manager.init().expect("Second init failed").applied, 0);

    let conn = manager.db().expect("Failed to get connection");
    assert!(!table_exists(&conn, "tags"));
}

#[test]
fn test_migrate_picks_up_new_files_on_open_handle() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    env.write_migration(
        "002_tags.sql",
        "CREATE TABLE tags (id INTEGER PRIMARY KEY);",
    );
    let report = manager.migrate().expect("Failed to migrate");

    assert_eq!(report.applied, 1);
    let status = manager.migration_status().expect("Failed to read status");
    assert_eq!(status.applied.len(), 2);
    assert!(status.pending.is_empty());
}

#[test]
fn test_db_initializes_lazily() {
    let env = notes_env();
    let manager = env.manager();
    assert!(!manager.is_open());

    {
        let conn = manager.db().expect("Failed to get connection");
        assert!(table_exists(&conn, "notes"));
    }

    assert!(manager.is_open());
}

#[test]
fn test_init_fails_without_migrations_dir() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.migrations_dir = env.temp_dir.path().join("missing");
    let manager = ConnectionManager::new(config);

    let err = manager.init().expect_err("Init should fail");

    assert!(matches!(err, StoreError::Configuration { .. }));
    assert!(!manager.is_open());
}

#[test]
fn test_failed_migration_leaves_manager_closed_and_retry_resumes() {
    let env = notes_env();
    env.write_migration("002_bad.sql", "CREATE TABLE notes (id INTEGER PRIMARY KEY);");
    let manager = env.manager();

    let err = manager.init().expect_err("Init should fail on 002");
    assert!(matches!(err, StoreError::MigrationApply { version: 2, .. }));
    assert!(!manager.is_open());

    env.write_migration("002_bad.sql", "ALTER TABLE notes ADD COLUMN title TEXT;");
    let report = manager.init().expect("Retry should succeed");
    assert_eq!(report.applied, 1);

    let conn = manager.db().expect("Failed to get connection");
    assert_eq!(history_versions(&conn), vec![1, 2]);
}

#[test]
fn test_with_tx_commits_on_success() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    let id = manager
        .with_tx(|tx| -> Result<i64, UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["first"])?;
            Ok(tx.last_insert_rowid())
        })
        .expect("Unit of work failed");

    assert!(id > 0);
    assert_eq!(note_count(&manager), 1);
}

#[test]
fn test_with_tx_rolls_back_and_returns_original_error() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    let err = manager
        .with_tx(|tx| -> Result<(), UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["doomed"])?;
            Err(UnitError::Rejected("changed my mind".into()))
        })
        .expect_err("Unit of work should fail");

    match err {
        UnitError::Rejected(reason) => assert_eq!(reason, "changed my mind"),
        other => panic!("Expected the original error, got {other:?}"),
    }
    assert_eq!(note_count(&manager), 0);
}

#[test]
fn test_with_tx_rolls_back_on_sql_error() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    let err = manager
        .with_tx(|tx| -> Result<(), UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["kept?"])?;
            tx.execute("INSERT INTO notes (body) VALUES (NULL)", [])?;
            Ok(())
        })
        .expect_err("NOT NULL violation should fail");

    assert!(matches!(err, UnitError::Sql(_)));
    assert_eq!(note_count(&manager), 0);
}

#[test]
fn test_with_tx_rolls_back_on_panic() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        manager.with_tx(|tx| -> Result<(), UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["panicked"])?;
            panic!("handler bug");
        })
    }));

    assert!(result.is_err());
    assert_eq!(note_count(&manager), 0);
    assert!(manager.health());
}

#[test]
fn test_nested_with_tx_is_rejected() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    let nested = manager
        .with_tx(|tx| -> Result<bool, UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["outer"])?;
            let inner = manager.with_tx(|_| -> Result<(), UnitError> { Ok(()) });
            Ok(matches!(inner, Err(UnitError::Store(StoreError::NestedTransaction))))
        })
        .expect("Outer unit of work failed");

    assert!(nested);
    assert_eq!(note_count(&manager), 1);
}

#[test]
fn test_db_inside_with_tx_is_rejected() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    let rejected = manager
        .with_tx(|_| -> Result<bool, UnitError> {
            Ok(matches!(manager.db(), Err(StoreError::NestedTransaction)))
        })
        .expect("Outer unit of work failed");

    assert!(rejected);
}

#[test]
fn test_savepoint_inside_with_tx() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");

    manager
        .with_tx(|tx| -> Result<(), UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["outer"])?;
            tx.execute_batch("SAVEPOINT inner")?;
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["inner"])?;
            tx.execute_batch("ROLLBACK TO inner; RELEASE inner")?;
            Ok(())
        })
        .expect("Unit of work failed");

    assert_eq!(note_count(&manager), 1);
}

#[test]
fn test_concurrent_units_of_work_are_serialized() {
    let env = notes_env();
    let manager = Arc::new(env.manager());
    manager.init().expect("Failed to initialize");

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..10 {
                    manager
                        .with_tx(|tx| -> Result<(), UnitError> {
                            tx.execute(
                                "INSERT INTO notes (body) VALUES (?1)",
                                [format!("worker {worker} note {i}")],
                            )?;
                            Ok(())
                        })
                        .expect("Concurrent unit of work failed");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("Worker panicked");
    }

    assert_eq!(note_count(&manager), 40);
}

#[test]
fn test_health_reports_liveness() {
    let env = notes_env();
    let manager = env.manager();

    assert!(manager.health(), "health initializes on demand");
    assert!(manager.is_open());
}

#[test]
fn test_health_is_false_when_open_fails() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.migrations_dir = env.temp_dir.path().join("missing");
    let manager = ConnectionManager::new(config);

    assert!(!manager.health());
}

#[test]
fn test_oversized_busy_timeout_fails_open_without_panicking() {
    let env = notes_env();
    let mut config = env.config();
    config.busy_timeout = Duration::from_millis(3_000_000_000);
    let manager = ConnectionManager::new(config);

    let err = manager.init().expect_err("Timeout beyond SQLite's limit should fail");
    assert!(matches!(err, StoreError::Configuration { .. }));
    assert!(!manager.is_open());
    assert!(!manager.health());
}

#[test]
fn test_checkpoint_and_vacuum() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");
    for i in 0..50 {
        manager
            .with_tx(|tx| -> Result<(), UnitError> {
                tx.execute("INSERT INTO notes (body) VALUES (?1)", [format!("note {i}")])?;
                Ok(())
            })
            .expect("Insert failed");
    }

    manager
        .checkpoint(CheckpointMode::default())
        .expect("Full checkpoint failed");
    manager
        .checkpoint(CheckpointMode::Truncate)
        .expect("Truncate checkpoint failed");
    manager.vacuum().expect("Vacuum failed");

    assert_eq!(note_count(&manager), 50);
}

#[test]
fn test_close_then_reinit_reopens_same_file() {
    let env = notes_env();
    let manager = env.manager();
    manager.init().expect("Failed to initialize");
    manager
        .with_tx(|tx| -> Result<(), UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["persisted"])?;
            Ok(())
        })
        .expect("Insert failed");

    manager.close().expect("Close failed");
    assert!(!manager.is_open());
    manager.close().expect("Second close should be a no-op");

    let report = manager.init().expect("Reinit failed");
    assert_eq!(report.applied, 0);
    assert!(manager.is_open());
    assert_eq!(note_count(&manager), 1);
}

#[test]
fn test_read_only_skips_migrations_and_rejects_writes() {
    let env = notes_env();
    let writer = env.manager();
    writer.init().expect("Failed to initialize writer");
    writer.close().expect("Failed to close writer");

    env.write_migration(
        "002_tags.sql",
        "CREATE TABLE tags (id INTEGER PRIMARY KEY);",
    );
    let mut config = env.config();
    config.read_only = true;
    let reader = ConnectionManager::new(config);

    let report = reader.init().expect("Read-only init failed");
    assert_eq!(report.applied, 0);
    assert!(reader.is_read_only());
    assert!(reader.health());

    let status = reader.migration_status().expect("Failed to read status");
    assert_eq!(status.applied.len(), 1);
    assert_eq!(status.pending.len(), 1);
    assert!(matches!(
        reader.migrate(),
        Err(StoreError::Configuration { .. })
    ));

    let err = reader
        .with_tx(|tx| -> Result<(), UnitError> {
            tx.execute("INSERT INTO notes (body) VALUES (?1)", ["nope"])?;
            Ok(())
        })
        .expect_err("Write on read-only handle should fail");
    assert!(matches!(err, UnitError::Sql(_)));

    let conn = reader.db().expect("Failed to get connection");
    assert!(!table_exists(&conn, "tags"));
}
