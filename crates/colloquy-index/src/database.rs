// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The [`Database`] struct IS the single writer: query modules
//! accept `&Database` and go through `connection().call()`. Do NOT create
//! additional Connection instances for writes.

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;

use colloquy_core::ColloquyError;

/// Convert a tokio-rusqlite error into a storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> ColloquyError {
    ColloquyError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the index database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if necessary) the database at `path` and run all
    /// pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, ColloquyError> {
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ColloquyError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = Connection::open(path.to_string())
            .await
            .map_err(|e| ColloquyError::Storage {
                source: Box::new(e),
            })?;

        let pragmas = if wal_mode {
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;"
        };
        conn.call(move |conn| conn.execute_batch(pragmas))
            .await
            .map_err(map_tr_err)?;
        conn.call(move |conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(|e| ColloquyError::Storage {
                source: Box::new(e),
            })?;

        debug!(path, wal_mode, "index database opened");
        Ok(Self { conn })
    }

    /// Returns the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), ColloquyError> {
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
