// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Kasuku webhook platform.

use thiserror::Error;

/// The primary error type used across all Kasuku crates.
///
/// Guard-level variants (signature, replay, rate limit, invalid payload)
/// resolve to an HTTP status plus an audit entry at the ingress and never
/// reach the queue. Worker-level variants are classified as transient
/// (retried with backoff) or permanent (dead-lettered directly) via
/// [`KasukuError::is_permanent`].
#[derive(Debug, Error)]
pub enum KasukuError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A guard's backing store is unreachable. The ingress fails closed on this.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Webhook signature missing, malformed, or not matching the raw body.
    #[error("webhook signature mismatch")]
    SignatureMismatch,

    /// A second delivery of an already-seen nonce.
    #[error("replayed event: nonce `{nonce}` already seen")]
    Replay { nonce: String },

    /// Caller exceeded the rate-limit ceiling and is locked out.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Payload could not be decoded into an envelope. Never retried.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// No handler registered for the selected flow. Never retried.
    #[error("no handler registered for flow `{flow}`")]
    HandlerNotFound { flow: String },

    /// Transient downstream failure (network, handler hiccup). Retried with backoff.
    #[error("transient processing failure: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation exceeded its deadline. Treated as transient.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KasukuError {
    /// Shorthand for a transient error with no underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        KasukuError::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Permanent failures skip the retry budget and go straight to dead-letter.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            KasukuError::InvalidPayload(_) | KasukuError::HandlerNotFound { .. }
        )
    }
}
