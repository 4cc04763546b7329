// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock domain handler for deterministic testing.
//!
//! `MockFlowHandler` implements `DomainHandler` with scripted failures,
//! captured envelopes, and a peak-concurrency probe for asserting the
//! worker pool's ceiling.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use kasuku_core::{
    ConversationState, DomainHandler, HandlerOutcome, KasukuError, WebhookEnvelope,
};

/// A mock flow handler for testing.
///
/// Captures every envelope it handles, fails a scripted number of times
/// before succeeding, optionally sleeps to hold its slot, and tracks the
/// peak number of concurrent invocations.
pub struct MockFlowHandler {
    flow: String,
    fail_times: AtomicI32,
    delay: Duration,
    handled: Mutex<Vec<WebhookEnvelope>>,
    calls: AtomicUsize,
    current: AtomicI32,
    peak: AtomicI32,
}

impl MockFlowHandler {
    /// A handler that always succeeds immediately.
    pub fn new(flow: impl Into<String>) -> Self {
        Self::with_script(flow, 0, Duration::ZERO)
    }

    /// A handler that fails the first `fail_times` invocations with a
    /// transient error, sleeping `delay` inside each invocation.
    pub fn with_script(flow: impl Into<String>, fail_times: i32, delay: Duration) -> Self {
        Self {
            flow: flow.into(),
            fail_times: AtomicI32::new(fail_times),
            delay,
            handled: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            current: AtomicI32::new(0),
            peak: AtomicI32::new(0),
        }
    }

    /// Total invocations, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Peak concurrent invocations observed.
    pub fn peak_concurrency(&self) -> i32 {
        self.peak.load(Ordering::SeqCst)
    }

    /// Envelopes from successful invocations.
    pub fn handled(&self) -> Vec<WebhookEnvelope> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl DomainHandler for MockFlowHandler {
    fn flow_id(&self) -> &str {
        &self.flow
    }

    async fn handle(
        &self,
        envelope: &WebhookEnvelope,
        mut state: ConversationState,
    ) -> Result<HandlerOutcome, KasukuError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
            return Err(KasukuError::transient("scripted mock failure"));
        }

        self.handled.lock().unwrap().push(envelope.clone());

        state.current_flow = Some(self.flow.clone());
        state.step_data = serde_json::json!({"last_event_id": envelope.event_id});
        state.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(HandlerOutcome {
            next_state: state,
            side_effects_completed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasuku_core::SourceChannel;

    fn envelope(event_id: &str) -> WebhookEnvelope {
        WebhookEnvelope {
            event_id: event_id.into(),
            received_at: chrono::Utc::now().to_rfc3339(),
            source_channel: SourceChannel::Whatsapp,
            caller_id: "+250788000001".into(),
            text: Some("rides".into()),
            payload: serde_json::json!({}),
            signature_valid: true,
            idempotency_key: format!("whatsapp:{event_id}"),
        }
    }

    #[tokio::test]
    async fn succeeds_and_captures_envelope() {
        let handler = MockFlowHandler::new("mobility");
        let outcome = handler
            .handle(&envelope("wamid.1"), ConversationState::new("+250788000001"))
            .await
            .unwrap();
        assert_eq!(outcome.next_state.current_flow.as_deref(), Some("mobility"));
        assert_eq!(handler.calls(), 1);
        assert_eq!(handler.handled().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let handler = MockFlowHandler::with_script("mobility", 2, Duration::ZERO);
        let state = ConversationState::new("c");

        assert!(handler.handle(&envelope("e"), state.clone()).await.is_err());
        assert!(handler.handle(&envelope("e"), state.clone()).await.is_err());
        assert!(handler.handle(&envelope("e"), state).await.is_ok());
        assert_eq!(handler.calls(), 3);
        // Only the successful invocation is captured.
        assert_eq!(handler.handled().len(), 1);
    }
}
