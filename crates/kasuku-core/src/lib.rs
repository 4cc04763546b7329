// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Kasuku webhook platform.
//!
//! This crate provides the shared error type, envelope and state types,
//! worker counters, and the injectable store/handler traits implemented by
//! the storage layer and by embedding applications.

pub mod error;
pub mod stats;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::KasukuError;
pub use stats::{StatsSnapshot, WorkerStats};
pub use types::{
    AuditEntry, AuditEventType, ConversationState, DeadLetterRecord, DispatchOutcome,
    HandlerOutcome, HealthStatus, ProcessedRecord, QueueEntry, RateDecision, SourceChannel,
    WebhookEnvelope,
};

pub use traits::{
    AuditStore, ConversationStore, DomainHandler, IdempotencyStore, MessageQueue, NonceStore,
    RateLimitStore,
};
