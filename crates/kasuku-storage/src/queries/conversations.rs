// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state persistence.
//!
//! `step_data` is stored as opaque JSON text; the router never interprets
//! it. Writes replace the whole row -- handlers own their full state shape.

use kasuku_core::KasukuError;
use rusqlite::params;

use crate::database::Database;
use crate::models::ConversationState;

/// Fetch a caller's conversation state, if any.
pub async fn get_state(
    db: &Database,
    caller_id: &str,
) -> Result<Option<ConversationState>, KasukuError> {
    let caller_id = caller_id.to_string();
    let row: Option<(String, Option<String>, String, String)> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT caller_id, current_flow, step_data, updated_at
                 FROM conversation_states WHERE caller_id = ?1",
                params![caller_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    row.map(|(caller_id, current_flow, step_data, updated_at)| {
        let step_data = serde_json::from_str(&step_data).map_err(|e| KasukuError::Storage {
            source: Box::new(e),
        })?;
        Ok(ConversationState {
            caller_id,
            current_flow,
            step_data,
            updated_at,
        })
    })
    .transpose()
}

/// Replace a caller's conversation state entirely.
pub async fn put_state(db: &Database, state: &ConversationState) -> Result<(), KasukuError> {
    let caller_id = state.caller_id.clone();
    let current_flow = state.current_flow.clone();
    let step_data = state.step_data.to_string();
    let updated_at = state.updated_at.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_states (caller_id, current_flow, step_data, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(caller_id) DO UPDATE SET
                     current_flow = excluded.current_flow,
                     step_data = excluded.step_data,
                     updated_at = excluded.updated_at",
                params![caller_id, current_flow, step_data, updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("conversations.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn missing_caller_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_state(&db, "+250780000000").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn state_roundtrips_with_opaque_step_data() {
        let (db, _dir) = setup_db().await;

        let state = ConversationState {
            caller_id: "+250788000001".into(),
            current_flow: Some("mobility".into()),
            step_data: serde_json::json!({"pickup": "Kigali", "step": 2}),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        put_state(&db, &state).await.unwrap();

        let loaded = get_state(&db, "+250788000001").await.unwrap().unwrap();
        assert_eq!(loaded, state);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn put_replaces_entire_state() {
        let (db, _dir) = setup_db().await;

        let first = ConversationState {
            caller_id: "c".into(),
            current_flow: Some("jobs".into()),
            step_data: serde_json::json!({"page": 3, "filter": "kigali"}),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        put_state(&db, &first).await.unwrap();

        // The handler returns a completely different shape: nothing from the
        // old step_data survives.
        let second = ConversationState {
            caller_id: "c".into(),
            current_flow: None,
            step_data: serde_json::json!({}),
            updated_at: "2026-01-01T00:01:00.000Z".into(),
        };
        put_state(&db, &second).await.unwrap();

        let loaded = get_state(&db, "c").await.unwrap().unwrap();
        assert_eq!(loaded, second);

        db.close().await.unwrap();
    }
}
