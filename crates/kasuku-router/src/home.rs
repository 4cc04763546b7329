// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in home-menu flow.
//!
//! Services the fallback flow so a bare deployment routes every unmatched
//! message somewhere sane. Real domain flows (mobility, insurance, jobs,
//! ...) are registered by the embedding application.

use async_trait::async_trait;

use kasuku_core::{ConversationState, DomainHandler, HandlerOutcome, KasukuError, WebhookEnvelope};

/// Handler for the `home` flow: records the contact and leaves the caller
/// at the menu with no active flow.
pub struct HomeMenuHandler;

#[async_trait]
impl DomainHandler for HomeMenuHandler {
    fn flow_id(&self) -> &str {
        "home"
    }

    async fn handle(
        &self,
        envelope: &WebhookEnvelope,
        state: ConversationState,
    ) -> Result<HandlerOutcome, KasukuError> {
        let next_state = ConversationState {
            caller_id: state.caller_id,
            current_flow: None,
            step_data: serde_json::json!({
                "menu_shown_at": envelope.received_at,
                "last_event_id": envelope.event_id,
            }),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        Ok(HandlerOutcome {
            next_state,
            side_effects_completed: true,
        })
    }
}
