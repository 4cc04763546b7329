// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::time::Duration;

use kasuku_core::KasukuError;

use crate::migrations;

/// Handle to the single SQLite connection used by the whole process.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, run migrations, and apply
    /// connection pragmas.
    ///
    /// Migrations run on a short-lived blocking connection before the
    /// long-lived writer connection opens.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, KasukuError> {
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), KasukuError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(|e| KasukuError::Storage {
                    source: Box::new(e),
                })?;
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {journal};
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;"
            ))
            .map_err(|e| KasukuError::Storage {
                source: Box::new(e),
            })?;
            migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| KasukuError::Internal(format!("migration task panicked: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| KasukuError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        Ok(Self { conn })
    }

    /// The shared tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the background connection thread.
    pub async fn close(&self) -> Result<(), KasukuError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Map a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_tr_err(err: tokio_rusqlite::Error) -> KasukuError {
    KasukuError::Storage {
        source: Box::new(err),
    }
}

/// Current UTC time in the same millisecond RFC 3339 shape the schema
/// defaults use (`strftime('%Y-%m-%dT%H:%M:%fZ')`), so string comparison
/// orders correctly.
pub(crate) fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// UTC time `delta` from now, same shape as [`now_ts`].
pub(crate) fn ts_after(delta: Duration) -> String {
    let delta = chrono::Duration::milliseconds(delta.as_millis().min(i64::MAX as u128) as i64);
    (chrono::Utc::now() + delta).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
