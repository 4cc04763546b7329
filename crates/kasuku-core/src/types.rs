// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Kasuku workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Messaging platform a webhook event originated from.
///
/// Each channel has a dedicated decoder at the ingress; raw untyped JSON
/// never crosses the ingress boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceChannel {
    Whatsapp,
    Sms,
}

/// The normalized, validated representation of one inbound webhook event.
///
/// Created at ingress after all guards pass, immutable thereafter, and
/// passed by value (as JSON) through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Provider-assigned event identifier (e.g. a WhatsApp message id).
    pub event_id: String,
    /// RFC 3339 timestamp recorded at ingress.
    pub received_at: String,
    /// Which channel decoder produced this envelope.
    pub source_channel: SourceChannel,
    /// Caller identity (phone number / device id) used for state and limits.
    pub caller_id: String,
    /// Extracted message text, when the event carries any.
    pub text: Option<String>,
    /// The decoded provider payload.
    pub payload: serde_json::Value,
    /// False only for events accepted through the unsigned-forwarding mode.
    pub signature_valid: bool,
    /// Key for the idempotency ledger, derived from the event id at ingress.
    pub idempotency_key: String,
}

/// Per-caller conversation progress, owned jointly by the router (reads to
/// pick a handler) and the domain handler (writes the next state).
///
/// `step_data` is opaque to the router; handlers own their full state shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub caller_id: String,
    pub current_flow: Option<String>,
    pub step_data: serde_json::Value,
    pub updated_at: String,
}

impl ConversationState {
    /// Fresh state for a caller with no active flow.
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            current_flow: None,
            step_data: serde_json::Value::Object(serde_json::Map::new()),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A row in the delivery queue wrapping one serialized payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub topic: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub available_at: String,
    pub locked_until: Option<String>,
}

/// Category of a security audit entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    SignatureMismatch,
    ReplayBlocked,
    RateLimited,
    InvalidPayload,
}

/// Append-only record of a guard rejection. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: AuditEventType,
    pub caller_id: String,
    pub occurred_at: String,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        event_type: AuditEventType,
        caller_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            caller_id: caller_id.into(),
            occurred_at: chrono::Utc::now().to_rfc3339(),
            details,
        }
    }
}

/// What a domain handler returns from [`crate::DomainHandler::handle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    /// The caller's next state, persisted as a full replacement.
    pub next_state: ConversationState,
    /// Whether the handler's side effects ran to completion.
    pub side_effects_completed: bool,
}

/// Result of a successful router dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub handler_id: String,
    pub next_state: ConversationState,
}

/// Payload published to the processed topic after a successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub envelope: WebhookEnvelope,
    pub handler_id: String,
    pub next_state_summary: String,
}

/// Payload published to the dead-letter topic after exhausted retries or a
/// permanent failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub payload: serde_json::Value,
    pub last_error: String,
    pub attempts: i32,
}

/// Verdict from the rate limiter for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Option<std::time::Duration>,
}

/// Health reported by store health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Mask a caller identifier for logging, keeping only the last four digits.
pub fn mask_caller(id: &str) -> String {
    let digits: String = id.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= 4 {
        format!("***{digits}")
    } else {
        format!("***{}", &digits[digits.len() - 4..])
    }
}
