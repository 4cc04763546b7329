// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replay-guard nonce operations.
//!
//! The whole guard is one atomic upsert: a fresh nonce inserts, an expired
//! nonce is taken over in the same statement, and a live duplicate changes
//! nothing -- zero rows changed IS the replay verdict. There is no
//! read-then-write window for concurrent deliveries to race through.

use std::time::Duration;

use kasuku_core::KasukuError;
use rusqlite::params;

use crate::database::{Database, now_ts, ts_after};

/// Record a nonce for a caller with the given TTL.
///
/// Returns `true` when the nonce is fresh (inserted, or an expired row was
/// reclaimed). `false` means the nonce is still live: a replay.
pub async fn check_and_store(
    db: &Database,
    nonce: &str,
    caller_id: &str,
    ttl: Duration,
) -> Result<bool, KasukuError> {
    let nonce = nonce.to_string();
    let caller_id = caller_id.to_string();
    let now = now_ts();
    let expires_at = ts_after(ttl);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO nonces (nonce, caller_id, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(nonce) DO UPDATE SET
                     caller_id = excluded.caller_id,
                     expires_at = excluded.expires_at
                 WHERE nonces.expires_at < ?4",
                params![nonce, caller_id, expires_at, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete expired nonce rows. Returns the number of rows removed.
///
/// Called by the maintenance sweep only -- the guard itself never reaps.
pub async fn sweep_expired(db: &Database) -> Result<usize, KasukuError> {
    let now = now_ts();
    db.connection()
        .call(move |conn| conn.execute("DELETE FROM nonces WHERE expires_at < ?1", params![now]))
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
        let db_path = dir.path().join("nonces.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn first_sight_is_fresh_second_is_replay() {
        let (db, _dir) = setup_db().await;

        assert!(check_and_store(&db, "abc123", "+250788000001", TTL).await.unwrap());
        assert!(!check_and_store(&db, "abc123", "+250788000001", TTL).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn replay_detected_regardless_of_caller() {
        let (db, _dir) = setup_db().await;

        assert!(check_and_store(&db, "wamid.1", "alice", TTL).await.unwrap());
        // Same nonce from a different caller is still a replay.
        assert!(!check_and_store(&db, "wamid.1", "mallory", TTL).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn distinct_nonces_are_independent() {
        let (db, _dir) = setup_db().await;

        assert!(check_and_store(&db, "wamid.1", "alice", TTL).await.unwrap());
        assert!(check_and_store(&db, "wamid.2", "alice", TTL).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_nonce_is_reclaimed_without_sweep() {
        let (db, _dir) = setup_db().await;

        assert!(check_and_store(&db, "n", "alice", Duration::ZERO).await.unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
        // TTL passed: the same nonce is fresh again even before any sweep ran.
        assert!(check_and_store(&db, "n", "alice", TTL).await.unwrap());
        // And now it is live again.
        assert!(!check_and_store(&db, "n", "alice", TTL).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let (db, _dir) = setup_db().await;

        check_and_store(&db, "old", "a", Duration::ZERO).await.unwrap();
        check_and_store(&db, "live", "a", TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let removed = sweep_expired(&db).await.unwrap();
        assert_eq!(removed, 1);

        // The live nonce still blocks replays.
        assert!(!check_and_store(&db, "live", "a", TTL).await.unwrap());

        db.close().await.unwrap();
    }
}
