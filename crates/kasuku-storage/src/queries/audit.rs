// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only security audit log.
//!
//! Rows are inserted by the ingress guards and never updated or deleted by
//! this core. Retention and rotation are external concerns.

use std::str::FromStr;

use kasuku_core::KasukuError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{AuditEntry, AuditEventType};

/// Append one audit entry.
pub async fn record(db: &Database, entry: &AuditEntry) -> Result<(), KasukuError> {
    let event_type = entry.event_type.to_string();
    let caller_id = entry.caller_id.clone();
    let occurred_at = entry.occurred_at.clone();
    let details = entry.details.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO security_audit (event_type, caller_id, occurred_at, details)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event_type, caller_id, occurred_at, details],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count entries of a given type. Used by tests and operational tooling.
pub async fn count_by_type(db: &Database, event_type: AuditEventType) -> Result<i64, KasukuError> {
    let event_type = event_type.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM security_audit WHERE event_type = ?1",
                params![event_type],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recent entries, newest first.
pub async fn recent(db: &Database, limit: i64) -> Result<Vec<AuditEntry>, KasukuError> {
    let rows: Vec<(String, String, String, Option<String>)> = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_type, caller_id, occurred_at, details
                 FROM security_audit ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    rows.into_iter()
        .map(|(event_type, caller_id, occurred_at, details)| {
            let event_type = AuditEventType::from_str(&event_type).map_err(|e| {
                KasukuError::Storage {
                    source: Box::new(e),
                }
            })?;
            let details = details
                .map(|d| serde_json::from_str(&d))
                .transpose()
                .map_err(|e| KasukuError::Storage {
                    source: Box::new(e),
                })?
                .unwrap_or(serde_json::Value::Null);
            Ok(AuditEntry {
                event_type,
                caller_id,
                occurred_at,
                details,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("audit.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn record_and_count_by_type() {
        let (db, _dir) = setup_db().await;

        record(
            &db,
            &AuditEntry::new(
                AuditEventType::SignatureMismatch,
                "+250788000001",
                serde_json::json!({"header": "sha256=bad"}),
            ),
        )
        .await
        .unwrap();
        record(
            &db,
            &AuditEntry::new(
                AuditEventType::ReplayBlocked,
                "+250788000001",
                serde_json::json!({"nonce": "wamid.1"}),
            ),
        )
        .await
        .unwrap();

        assert_eq!(
            count_by_type(&db, AuditEventType::SignatureMismatch)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            count_by_type(&db, AuditEventType::ReplayBlocked).await.unwrap(),
            1
        );
        assert_eq!(
            count_by_type(&db, AuditEventType::RateLimited).await.unwrap(),
            0
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let (db, _dir) = setup_db().await;

        for i in 0..3 {
            record(
                &db,
                &AuditEntry::new(
                    AuditEventType::RateLimited,
                    format!("caller-{i}"),
                    serde_json::json!({"n": i}),
                ),
            )
            .await
            .unwrap();
        }

        let entries = recent(&db, 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].caller_id, "caller-2");
        assert_eq!(entries[1].caller_id, "caller-1");

        db.close().await.unwrap();
    }
}
