// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency record operations.
//!
//! `result_payload` is written at most once per live key: the insert is the
//! compare-and-set. Concurrent writers lose gracefully (zero rows changed)
//! and must read back the winner's result.

use std::time::Duration;

use kasuku_core::KasukuError;
use rusqlite::params;

use crate::database::{Database, now_ts, ts_after};

/// Fetch the stored result for a key, if present and not expired.
pub async fn get(db: &Database, key: &str) -> Result<Option<serde_json::Value>, KasukuError> {
    let key = key.to_string();
    let now = now_ts();
    let raw: Option<String> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT result_payload FROM idempotency_records
                 WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get(0),
            );
            match result {
                Ok(payload) => Ok(Some(payload)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| KasukuError::Storage {
            source: Box::new(e),
        })
    })
    .transpose()
}

/// Store a result unless a live one already exists for the key.
///
/// Returns `true` when this writer won. Expired rows are taken over in the
/// same statement.
pub async fn put_if_absent(
    db: &Database,
    key: &str,
    result: &serde_json::Value,
    ttl: Duration,
) -> Result<bool, KasukuError> {
    let key = key.to_string();
    let payload = result.to_string();
    let now = now_ts();
    let expires_at = ts_after(ttl);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO idempotency_records (key, result_payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     result_payload = excluded.result_payload,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at
                 WHERE idempotency_records.expires_at < ?3",
                params![key, payload, now, expires_at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete expired records. Returns the number of rows removed.
pub async fn sweep_expired(db: &Database) -> Result<usize, KasukuError> {
    let now = now_ts();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM idempotency_records WHERE expires_at < ?1",
                params![now],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TTL: Duration = Duration::from_secs(3600);

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("idempotency.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, "evt-1").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn first_writer_wins() {
        let (db, _dir) = setup_db().await;

        let first = serde_json::json!({"handler_id": "mobility"});
        let second = serde_json::json!({"handler_id": "insurance"});

        assert!(put_if_absent(&db, "evt-1", &first, TTL).await.unwrap());
        assert!(!put_if_absent(&db, "evt-1", &second, TTL).await.unwrap());

        // The loser's write never landed.
        let stored = get(&db, "evt-1").await.unwrap().unwrap();
        assert_eq!(stored, first);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_record_is_replaced() {
        let (db, _dir) = setup_db().await;

        let old = serde_json::json!({"v": 1});
        let new = serde_json::json!({"v": 2});

        assert!(put_if_absent(&db, "k", &old, Duration::ZERO).await.unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Expired: reads miss, and a new writer takes the key over.
        assert!(get(&db, "k").await.unwrap().is_none());
        assert!(put_if_absent(&db, "k", &new, TTL).await.unwrap());
        assert_eq!(get(&db, "k").await.unwrap().unwrap(), new);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_expired_records() {
        let (db, _dir) = setup_db().await;

        put_if_absent(&db, "old", &serde_json::json!(1), Duration::ZERO)
            .await
            .unwrap();
        put_if_absent(&db, "live", &serde_json::json!(2), TTL)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sweep_expired(&db).await.unwrap(), 1);
        assert!(get(&db, "live").await.unwrap().is_some());

        db.close().await.unwrap();
    }
}
