// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel payload decoders.
//!
//! Raw provider JSON never crosses the ingress boundary: every accepted
//! request is decoded into a typed event here, or rejected with an
//! `InvalidPayload` error. Channel detection is structural -- the WhatsApp
//! cloud shape nests under `entry[].changes[].value`, the SMS gateway posts
//! a flat object.

use kasuku_core::{KasukuError, SourceChannel};

/// Outcome of decoding one request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A user event worth enqueueing.
    Event {
        channel: SourceChannel,
        event_id: String,
        caller_id: String,
        text: Option<String>,
    },
    /// Delivery receipts / status updates: acknowledged, never enqueued.
    StatusOnly,
}

/// Decode a validated-JSON request body into a typed event.
pub fn decode_payload(payload: &serde_json::Value) -> Result<Decoded, KasukuError> {
    if payload.get("entry").is_some() {
        return decode_whatsapp(payload);
    }
    if payload.get("message_id").is_some() {
        return decode_sms(payload);
    }
    Err(KasukuError::InvalidPayload(
        "unrecognized payload shape: expected WhatsApp `entry` or SMS `message_id`".into(),
    ))
}

/// WhatsApp cloud webhook: `entry[0].changes[0].value.{messages,statuses}`.
fn decode_whatsapp(payload: &serde_json::Value) -> Result<Decoded, KasukuError> {
    let value = payload
        .pointer("/entry/0/changes/0/value")
        .ok_or_else(|| KasukuError::InvalidPayload("missing entry[0].changes[0].value".into()))?;

    if let Some(message) = value.pointer("/messages/0") {
        let event_id = require_str(message, "id", "messages[0].id")?;
        let caller_id = require_str(message, "from", "messages[0].from")?;
        let text = extract_whatsapp_text(message);
        return Ok(Decoded::Event {
            channel: SourceChannel::Whatsapp,
            event_id,
            caller_id,
            text,
        });
    }

    // Statuses-only payloads are delivery receipts; nothing to process.
    if value
        .get("statuses")
        .and_then(|s| s.as_array())
        .is_some_and(|s| !s.is_empty())
    {
        return Ok(Decoded::StatusOnly);
    }

    Err(KasukuError::InvalidPayload(
        "WhatsApp payload carries neither messages nor statuses".into(),
    ))
}

/// Message text, or the reply id for interactive button/list responses.
fn extract_whatsapp_text(message: &serde_json::Value) -> Option<String> {
    if let Some(body) = message.pointer("/text/body").and_then(|v| v.as_str()) {
        return Some(body.to_string());
    }
    for reply in ["button_reply", "list_reply"] {
        if let Some(id) = message
            .pointer(&format!("/interactive/{reply}/id"))
            .and_then(|v| v.as_str())
        {
            return Some(id.to_string());
        }
    }
    None
}

/// SMS gateway webhook: flat `{message_id, from, text}`.
fn decode_sms(payload: &serde_json::Value) -> Result<Decoded, KasukuError> {
    let event_id = require_str(payload, "message_id", "message_id")?;
    let caller_id = require_str(payload, "from", "from")?;
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(Decoded::Event {
        channel: SourceChannel::Sms,
        event_id,
        caller_id,
        text,
    })
}

fn require_str(
    value: &serde_json::Value,
    key: &str,
    label: &str,
) -> Result<String, KasukuError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| KasukuError::InvalidPayload(format!("missing {label}")))
}
