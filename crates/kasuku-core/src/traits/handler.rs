// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain handler trait, the boundary to the (external) flow implementations.

use async_trait::async_trait;

use crate::error::KasukuError;
use crate::types::{HandlerOutcome, WebhookEnvelope};

/// One domain flow (mobility, insurance, jobs, ...) the router can dispatch to.
///
/// Implementations must be idempotent-safe themselves or rely on the
/// ledger's at-most-once guarantee, and must not block indefinitely -- the
/// router enforces a timeout around every invocation.
#[async_trait]
pub trait DomainHandler: Send + Sync + 'static {
    /// Stable flow identifier this handler is registered under.
    fn flow_id(&self) -> &str;

    /// Process one envelope against the caller's current state.
    ///
    /// The returned state replaces the prior state entirely; the router
    /// never merges partial updates.
    async fn handle(
        &self,
        envelope: &WebhookEnvelope,
        state: crate::types::ConversationState,
    ) -> Result<HandlerOutcome, KasukuError>;
}
