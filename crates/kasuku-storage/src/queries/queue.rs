// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe, at-least-once message delivery.
//!
//! Entries move through `pending -> processing -> completed`. A failed
//! attempt returns the entry to `pending` with a future `available_at`.
//! Claims carry a visibility timeout (`locked_until`); claims that outlive
//! it are reclaimed on the next dequeue, so a worker crash means redelivery,
//! never loss.

use std::time::Duration;

use kasuku_core::KasukuError;
use rusqlite::params;

use crate::database::{Database, now_ts, ts_after};
use crate::models::QueueEntry;

/// Append a payload to the named topic. Returns the queue entry ID.
pub async fn enqueue(
    db: &Database,
    topic: &str,
    payload: &str,
    max_attempts: i32,
) -> Result<i64, KasukuError> {
    let topic = topic.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (topic, payload, max_attempts) VALUES (?1, ?2, ?3)",
                params![topic, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the next available entry from the named topic.
///
/// Atomically: reclaims entries whose visibility timeout expired, then
/// selects the oldest pending entry that is due (`available_at` reached)
/// and marks it `processing` until `now + visibility_timeout`. Returns
/// `None` when nothing is ready.
pub async fn dequeue(
    db: &Database,
    topic: &str,
    visibility_timeout: Duration,
) -> Result<Option<QueueEntry>, KasukuError> {
    let topic = topic.to_string();
    let now = now_ts();
    let lock_until = ts_after(visibility_timeout);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Redeliver entries whose claim expired (crashed worker).
            tx.execute(
                "UPDATE queue SET status = 'pending', locked_until = NULL, updated_at = ?2
                 WHERE topic = ?1 AND status = 'processing' AND locked_until < ?2",
                params![topic, now],
            )?;

            let result = {
                let mut stmt = tx.prepare(
                    "SELECT id, topic, payload, status, attempts, max_attempts, last_error,
                            created_at, updated_at, available_at, locked_until
                     FROM queue
                     WHERE topic = ?1 AND status = 'pending' AND available_at <= ?2
                     ORDER BY id ASC
                     LIMIT 1",
                )?;
                stmt.query_row(params![topic, now], |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        topic: row.get(1)?,
                        payload: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get(4)?,
                        max_attempts: row.get(5)?,
                        last_error: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                        available_at: row.get(9)?,
                        locked_until: row.get(10)?,
                    })
                })
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE queue SET status = 'processing', locked_until = ?2, updated_at = ?3
                         WHERE id = ?1",
                        params![entry.id, lock_until, now],
                    )?;
                    tx.commit()?;

                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        locked_until: Some(lock_until),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful processing: marks the entry `completed`.
pub async fn ack(db: &Database, id: i64) -> Result<(), KasukuError> {
    let now = now_ts();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed attempt: increments `attempts`, stores the error, and
/// reschedules the entry to become available after `retry_delay`.
///
/// Dead-lettering is the caller's decision -- this function only requeues.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    retry_delay: Duration,
) -> Result<(), KasukuError> {
    let error = error.to_string();
    let now = now_ts();
    let available_at = ts_after(retry_delay);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'pending', attempts = attempts + 1,
                 last_error = ?2, available_at = ?3, locked_until = NULL, updated_at = ?4
                 WHERE id = ?1",
                params![id, error, available_at, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count entries on a topic with the given status.
pub async fn count(db: &Database, topic: &str, status: &str) -> Result<i64, KasukuError> {
    let topic = topic.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM queue WHERE topic = ?1 AND status = ?2",
                params![topic, status],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List entries on a topic, oldest first. Used by tests and DLQ inspection.
pub async fn list_topic(
    db: &Database,
    topic: &str,
    limit: i64,
) -> Result<Vec<QueueEntry>, KasukuError> {
    let topic = topic.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic, payload, status, attempts, max_attempts, last_error,
                        created_at, updated_at, available_at, locked_until
                 FROM queue WHERE topic = ?1 ORDER BY id ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![topic, limit], |row| {
                Ok(QueueEntry {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    payload: row.get(2)?,
                    status: row.get(3)?,
                    attempts: row.get(4)?,
                    max_attempts: row.get(5)?,
                    last_error: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                    available_at: row.get(9)?,
                    locked_until: row.get(10)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete completed entries last touched before the cutoff. Returns the
/// number of rows removed.
pub async fn prune_completed(db: &Database, cutoff: &str) -> Result<usize, KasukuError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM queue WHERE status = 'completed' AND updated_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const VISIBILITY: Duration = Duration::from_secs(300);

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn enqueue_and_dequeue_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "wa_inbound", r#"{"event_id":"wamid.1"}"#, 3)
            .await
            .unwrap();
        assert!(id > 0);

        let entry = dequeue(&db, "wa_inbound", VISIBILITY).await.unwrap();
        assert!(entry.is_some());
        let entry = entry.unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.status, "processing");
        assert_eq!(entry.topic, "wa_inbound");
        assert_eq!(entry.payload, r#"{"event_id":"wamid.1"}"#);
        assert_eq!(entry.max_attempts, 3);
        assert!(entry.locked_until.is_some());

        // Entry is claimed; nothing else is ready.
        let next = dequeue(&db, "wa_inbound", VISIBILITY).await.unwrap();
        assert!(next.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let (db, _dir) = setup_db().await;

        enqueue(&db, "wa_inbound", "a", 3).await.unwrap();
        enqueue(&db, "wa_dlq", "b", 3).await.unwrap();

        let entry = dequeue(&db, "wa_dlq", VISIBILITY).await.unwrap().unwrap();
        assert_eq!(entry.payload, "b");

        let entry = dequeue(&db, "wa_inbound", VISIBILITY).await.unwrap().unwrap();
        assert_eq!(entry.payload, "a");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ack_marks_completed() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "t", "payload", 3).await.unwrap();
        let _entry = dequeue(&db, "t", VISIBILITY).await.unwrap().unwrap();

        ack(&db, id).await.unwrap();

        assert_eq!(count(&db, "t", "completed").await.unwrap(), 1);
        assert_eq!(count(&db, "t", "pending").await.unwrap(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_increments_attempts_and_schedules_retry() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "t", "payload", 3).await.unwrap();
        let _entry = dequeue(&db, "t", VISIBILITY).await.unwrap().unwrap();

        fail(&db, id, "downstream timeout", Duration::from_secs(60))
            .await
            .unwrap();

        let entries = list_topic(&db, "t", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "pending");
        assert_eq!(entries[0].attempts, 1);
        assert_eq!(entries[0].last_error.as_deref(), Some("downstream timeout"));

        // Not yet available: scheduled a minute out.
        let next = dequeue(&db, "t", VISIBILITY).await.unwrap();
        assert!(next.is_none(), "retry must respect available_at");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_with_zero_delay_redelivers_immediately() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "t", "payload", 3).await.unwrap();
        let _ = dequeue(&db, "t", VISIBILITY).await.unwrap().unwrap();
        fail(&db, id, "boom", Duration::ZERO).await.unwrap();

        let entry = dequeue(&db, "t", VISIBILITY).await.unwrap();
        assert!(entry.is_some());
        assert_eq!(entry.unwrap().attempts, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_claim_is_reclaimed() {
        let (db, _dir) = setup_db().await;

        enqueue(&db, "t", "payload", 3).await.unwrap();

        // Claim with an already-expired visibility timeout (crashed worker).
        let entry = dequeue(&db, "t", Duration::ZERO).await.unwrap();
        assert!(entry.is_some());

        // A later dequeue reclaims and redelivers it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let redelivered = dequeue(&db, "t", VISIBILITY).await.unwrap();
        assert!(redelivered.is_some(), "expired claim should be redelivered");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn dequeue_empty_topic_returns_none() {
        let (db, _dir) = setup_db().await;
        let result = dequeue(&db, "nonexistent", VISIBILITY).await.unwrap();
        assert!(result.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn prune_completed_removes_only_old_completed() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "t", "done", 3).await.unwrap();
        let _ = dequeue(&db, "t", VISIBILITY).await.unwrap().unwrap();
        ack(&db, id).await.unwrap();
        enqueue(&db, "t", "pending", 3).await.unwrap();

        let removed = prune_completed(&db, &ts_after(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count(&db, "t", "pending").await.unwrap(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_writers_no_sqlite_busy() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("concurrent_test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();

        // Spawn 10 concurrent tasks all writing through the same Database.
        let mut handles = Vec::new();
        for i in 0..10 {
            let conn = db.connection().clone();
            let handle = tokio::spawn(async move {
                conn.call(move |conn| -> Result<(), rusqlite::Error> {
                    conn.execute(
                        "INSERT INTO queue (topic, payload) VALUES (?1, ?2)",
                        params![format!("t-{i}"), format!(r#"{{"n":{i}}}"#)],
                    )?;
                    Ok(())
                })
                .await
            });
            handles.push(handle);
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_ok(), "concurrent write failed: {result:?}");
        }

        let total: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(total, 10);

        db.close().await.unwrap();
    }
}
