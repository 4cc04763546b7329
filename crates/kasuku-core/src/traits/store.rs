// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store traits for the guard and queue subsystems.
//!
//! Every operation here must be atomic at the storage layer
//! (insert-if-absent or equivalent), never read-then-write, so concurrent
//! deliveries of the same event cannot race each other.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::KasukuError;
use crate::types::{AuditEntry, ConversationState, QueueEntry, RateDecision};

/// Replay guard backed by a persistent nonce table.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Atomically record a nonce for a caller with the given TTL.
    ///
    /// Returns `true` when the nonce is fresh. `false` means the nonce was
    /// already recorded and still live: the delivery is a replay. Store
    /// failures surface as errors so callers can fail closed.
    async fn check_and_store(
        &self,
        nonce: &str,
        caller_id: &str,
        ttl: Duration,
    ) -> Result<bool, KasukuError>;
}

/// Backing store for the idempotency ledger.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Fetch the stored result for a key, if one exists and has not expired.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KasukuError>;

    /// Store a result unless one already exists for the key.
    ///
    /// Returns `true` when this writer won. `false` means a concurrent
    /// writer already stored a result; the caller must discard its local
    /// result and read the winner's instead.
    async fn put_if_absent(
        &self,
        key: &str,
        result: &serde_json::Value,
        ttl: Duration,
    ) -> Result<bool, KasukuError>;
}

/// Per-caller conversation state persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_state(&self, caller_id: &str) -> Result<Option<ConversationState>, KasukuError>;

    /// Replace the caller's state entirely with the handler's returned state.
    async fn put_state(&self, state: &ConversationState) -> Result<(), KasukuError>;
}

/// Append-only security audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), KasukuError>;
}

/// Durable multi-topic delivery queue with at-least-once semantics.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a payload to the named topic. Returns the queue entry id.
    async fn enqueue(
        &self,
        topic: &str,
        payload: &str,
        max_attempts: i32,
    ) -> Result<i64, KasukuError>;

    /// Claim the next available entry from the topic, marking it in-flight
    /// for `visibility_timeout`. Entries whose previous claim expired are
    /// redelivered. Returns `None` when nothing is ready.
    async fn dequeue(
        &self,
        topic: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueEntry>, KasukuError>;

    /// Mark an entry as successfully processed.
    async fn ack(&self, id: i64) -> Result<(), KasukuError>;

    /// Record a failed attempt and reschedule the entry after `retry_delay`.
    async fn fail(&self, id: i64, error: &str, retry_delay: Duration) -> Result<(), KasukuError>;
}

/// Abuse-mitigation rate limiting keyed by caller identity.
///
/// State is ephemeral by contract: losing it on restart fails open.
pub trait RateLimitStore: Send + Sync {
    fn allow(&self, identifier: &str) -> RateDecision;
}
