// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;

use taskloom_core::TaskloomError;

/// Convert tokio_rusqlite errors into TaskloomError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> TaskloomError {
    TaskloomError::Storage {
        source: Box::new(e),
    }
}

/// Convert a raw rusqlite error (e.g. from connection open) into TaskloomError::Storage.
pub(crate) fn map_sqlite_err(e: rusqlite::Error) -> TaskloomError {
    TaskloomError::Storage {
        source: Box::new(e),
    }
}

/// Collapse a `call` result whose closure returns `TaskloomError`: unwrap the
/// application error, otherwise box the connection-level error into Storage.
fn flatten_call_err(e: tokio_rusqlite::Error<TaskloomError>) -> TaskloomError {
    match e {
        tokio_rusqlite::Error::Error(te) => te,
        other => TaskloomError::Storage {
            source: Box::new(other),
        },
    }
}

/// Handle to the embedded SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, TaskloomError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TaskloomError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = Connection::open(path).await.map_err(map_sqlite_err)?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
            .map_err(map_sqlite_err)?;
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(flatten_call_err)?;

        debug!(path, "SQLite database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database with the full schema (tests).
    pub async fn open_in_memory() -> Result<Self, TaskloomError> {
        let conn = Connection::open_in_memory().await.map_err(map_sqlite_err)?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(map_sqlite_err)?;
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(flatten_call_err)?;
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Verify the database answers queries.
    pub async fn health_check(&self) -> Result<(), TaskloomError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint WAL before shutdown.
    pub async fn close(&self) -> Result<(), TaskloomError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_database_file_and_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        assert!(db_path.exists());
        db.health_check().await.unwrap();

        // Schema tables exist after migrations.
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('projects', 'memory_records', 'project_summaries',
                                  'tasks', 'task_history', 'migration_runs')",
                    [],
                    |row| row.get(0),
                )?;
                Ok::<_, rusqlite::Error>(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 6);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_is_idempotent_across_restarts() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        let path = db_path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        db.close().await.unwrap();
        drop(db);

        // Second open re-runs the migration runner; refinery skips applied ones.
        let db = Database::open(path).await.unwrap();
        db.health_check().await.unwrap();
    }
}
