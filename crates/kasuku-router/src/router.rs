// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation routing: select a domain handler, invoke it under a
//! timeout, persist the returned state.
//!
//! Selection priority: the caller's active flow > keyword match on the
//! message text > the home fallback flow. The router never interprets
//! `step_data` and never merges states -- the handler's returned state
//! replaces the prior state entirely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use kasuku_core::types::mask_caller;
use kasuku_core::{
    ConversationState, ConversationStore, DispatchOutcome, DomainHandler, KasukuError,
    WebhookEnvelope,
};

use crate::keywords;

/// Why a flow was selected for an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// The caller already has an active flow.
    ActiveFlow,
    /// The message text matched a flow keyword.
    Keyword,
    /// Nothing matched; the home flow takes it.
    Fallback,
}

/// A routing decision before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSelection {
    pub flow: String,
    pub reason: SelectionReason,
}

/// Pick the flow for an envelope given the caller's state.
pub fn select_flow(state: &ConversationState, text: Option<&str>) -> FlowSelection {
    if let Some(flow) = &state.current_flow {
        return FlowSelection {
            flow: flow.clone(),
            reason: SelectionReason::ActiveFlow,
        };
    }
    if let Some(flow) = text.and_then(keywords::flow_for_text) {
        return FlowSelection {
            flow: flow.to_string(),
            reason: SelectionReason::Keyword,
        };
    }
    FlowSelection {
        flow: keywords::DEFAULT_FLOW.to_string(),
        reason: SelectionReason::Fallback,
    }
}

/// Registry of domain handlers keyed by flow id.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn DomainHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own flow id. Last registration wins.
    pub fn register(&mut self, handler: Arc<dyn DomainHandler>) {
        self.handlers.insert(handler.flow_id().to_string(), handler);
    }

    pub fn get(&self, flow: &str) -> Option<Arc<dyn DomainHandler>> {
        self.handlers.get(flow).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Routes envelopes to domain handlers and persists their state.
pub struct ConversationRouter {
    registry: HandlerRegistry,
    states: Arc<dyn ConversationStore>,
    handler_timeout: Duration,
}

impl ConversationRouter {
    pub fn new(
        registry: HandlerRegistry,
        states: Arc<dyn ConversationStore>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            states,
            handler_timeout,
        }
    }

    /// Dispatch one envelope to the right handler.
    ///
    /// An unregistered flow is a permanent error: the worker dead-letters
    /// the envelope with a clear reason instead of crashing the pool.
    /// Handler timeouts surface as [`KasukuError::Timeout`] (transient).
    pub async fn dispatch(&self, envelope: &WebhookEnvelope) -> Result<DispatchOutcome, KasukuError> {
        let state = self
            .states
            .get_state(&envelope.caller_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(&envelope.caller_id));

        let selection = select_flow(&state, envelope.text.as_deref());
        debug!(
            flow = %selection.flow,
            reason = ?selection.reason,
            caller = %mask_caller(&envelope.caller_id),
            event_id = %envelope.event_id,
            "routing decision"
        );

        let Some(handler) = self.registry.get(&selection.flow) else {
            warn!(flow = %selection.flow, "no handler registered for flow");
            return Err(KasukuError::HandlerNotFound {
                flow: selection.flow,
            });
        };

        let outcome = tokio::time::timeout(self.handler_timeout, handler.handle(envelope, state))
            .await
            .map_err(|_| KasukuError::Timeout {
                duration: self.handler_timeout,
            })??;

        self.states.put_state(&outcome.next_state).await?;

        Ok(DispatchOutcome {
            handler_id: selection.flow,
            next_state: outcome.next_state,
        })
    }
}
