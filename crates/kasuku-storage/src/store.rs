// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the kasuku-core store traits.
//!
//! One `SqliteStore` backs the nonce guard, idempotency ledger, delivery
//! queue, conversation states, and security audit log, all through the
//! single writer connection.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use kasuku_config::model::StorageConfig;
use kasuku_core::{
    AuditEntry, AuditStore, ConversationState, ConversationStore, HealthStatus, IdempotencyStore,
    KasukuError, MessageQueue, NonceStore, QueueEntry,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store for all persistent guard and queue state.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open the database at the configured path and run migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, KasukuError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite store initialized");
        Ok(Self { db })
    }

    /// The underlying database handle, for query modules and tests.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> Result<HealthStatus, KasukuError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    /// Remove expired nonce and idempotency rows and completed queue rows
    /// older than `completed_retention`. Returns total rows removed.
    ///
    /// This is the store-side TTL reclaim; the guards themselves never reap.
    pub async fn run_maintenance(
        &self,
        completed_retention: Duration,
    ) -> Result<usize, KasukuError> {
        let nonces = queries::nonces::sweep_expired(&self.db).await?;
        let records = queries::idempotency::sweep_expired(&self.db).await?;
        // Retention cutoff is in the past: now - retention.
        let cutoff = chrono::Utc::now()
            - chrono::Duration::milliseconds(
                completed_retention.as_millis().min(i64::MAX as u128) as i64,
            );
        let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let pruned = queries::queue::prune_completed(&self.db, &cutoff).await?;

        let total = nonces + records + pruned;
        if total > 0 {
            debug!(nonces, records, pruned, "maintenance sweep removed expired rows");
        }
        Ok(total)
    }

    /// Checkpoint the WAL and release the connection.
    pub async fn close(&self) -> Result<(), KasukuError> {
        self.db.close().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl NonceStore for SqliteStore {
    async fn check_and_store(
        &self,
        nonce: &str,
        caller_id: &str,
        ttl: Duration,
    ) -> Result<bool, KasukuError> {
        queries::nonces::check_and_store(&self.db, nonce, caller_id, ttl).await
    }
}

#[async_trait]
impl IdempotencyStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KasukuError> {
        queries::idempotency::get(&self.db, key).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        result: &serde_json::Value,
        ttl: Duration,
    ) -> Result<bool, KasukuError> {
        queries::idempotency::put_if_absent(&self.db, key, result, ttl).await
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_state(&self, caller_id: &str) -> Result<Option<ConversationState>, KasukuError> {
        queries::conversations::get_state(&self.db, caller_id).await
    }

    async fn put_state(&self, state: &ConversationState) -> Result<(), KasukuError> {
        queries::conversations::put_state(&self.db, state).await
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn record(&self, entry: &AuditEntry) -> Result<(), KasukuError> {
        queries::audit::record(&self.db, entry).await
    }
}

#[async_trait]
impl MessageQueue for SqliteStore {
    async fn enqueue(
        &self,
        topic: &str,
        payload: &str,
        max_attempts: i32,
    ) -> Result<i64, KasukuError> {
        queries::queue::enqueue(&self.db, topic, payload, max_attempts).await
    }

    async fn dequeue(
        &self,
        topic: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueEntry>, KasukuError> {
        queries::queue::dequeue(&self.db, topic, visibility_timeout).await
    }

    async fn ack(&self, id: i64) -> Result<(), KasukuError> {
        queries::queue::ack(&self.db, id).await
    }

    async fn fail(&self, id: i64, error: &str, retry_delay: Duration) -> Result<(), KasukuError> {
        queries::queue::fail(&self.db, id, error, retry_delay).await
    }
}
