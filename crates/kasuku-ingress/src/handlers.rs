// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the ingress endpoint.
//!
//! POST /webhook runs the gates in fixed order: signature, payload decode,
//! nonce, rate limit. A spoofed caller is rejected before it can consume a
//! nonce slot or rate budget for the identity it impersonates. Accepted
//! events are enqueued; nothing here touches domain logic.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use kasuku_core::types::mask_caller;
use kasuku_core::{AuditEntry, AuditEventType, SourceChannel, WebhookEnvelope};

use crate::decode::{Decoded, decode_payload};
use crate::server::IngressState;

/// Response body for POST /webhook. The caller never waits for processing.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub worker: kasuku_core::StatsSnapshot,
}

/// Query parameters of the provider verification handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// POST /webhook
///
/// Gate order is load-bearing: signature first, so spoofed requests never
/// consume nonce slots or rate budget for the identity they fake.
pub async fn post_webhook(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    // Gate 1: signature over the raw body.
    let signature_header = headers
        .get(&state.options.signature_header)
        .and_then(|v| v.to_str().ok());
    let check = state.verifier.verify(&body, signature_header);
    if !check.accepted() {
        audit(
            &state,
            AuditEventType::SignatureMismatch,
            "unverified",
            serde_json::json!({
                "request_id": request_id,
                "header_present": signature_header.is_some(),
            }),
        )
        .await;
        kasuku_metrics::record_ingress_rejected("signature");
        return reject(
            StatusCode::UNAUTHORIZED,
            &request_id,
            "invalid_signature",
            None,
        );
    }

    // Decode before the identity-keyed gates: nonce and rate limit need the
    // event id and caller id.
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            audit(
                &state,
                AuditEventType::InvalidPayload,
                "unverified",
                serde_json::json!({"request_id": request_id, "reason": format!("invalid json: {e}")}),
            )
            .await;
            kasuku_metrics::record_ingress_rejected("invalid_payload");
            return reject(StatusCode::BAD_REQUEST, &request_id, "invalid_json", None);
        }
    };
    let decoded = match decode_payload(&payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            audit(
                &state,
                AuditEventType::InvalidPayload,
                "unverified",
                serde_json::json!({"request_id": request_id, "reason": e.to_string()}),
            )
            .await;
            kasuku_metrics::record_ingress_rejected("invalid_payload");
            return reject(StatusCode::BAD_REQUEST, &request_id, "invalid_payload", None);
        }
    };

    let (channel, event_id, caller_id, text) = match decoded {
        Decoded::StatusOnly => {
            // Delivery receipts are acknowledged without enqueueing.
            debug!(request_id = %request_id, "statuses-only payload, fast-ack");
            return accept(&request_id);
        }
        Decoded::Event {
            channel,
            event_id,
            caller_id,
            text,
        } => (channel, event_id, caller_id, text),
    };

    // Gate 2: nonce/replay. The store failing means we cannot prove
    // freshness, so the request is rejected (fail closed).
    match state
        .nonces
        .check_and_store(&event_id, &caller_id, state.options.nonce_ttl)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            audit(
                &state,
                AuditEventType::ReplayBlocked,
                &caller_id,
                serde_json::json!({"request_id": request_id, "nonce": event_id}),
            )
            .await;
            kasuku_metrics::record_ingress_rejected("replay");
            debug!(
                caller = %mask_caller(&caller_id),
                nonce = %event_id,
                "replayed delivery blocked"
            );
            return reject(StatusCode::CONFLICT, &request_id, "replay", None);
        }
        Err(e) => {
            warn!(error = %e, "nonce store unavailable, failing closed");
            kasuku_metrics::record_ingress_rejected("store_unavailable");
            return reject(
                StatusCode::SERVICE_UNAVAILABLE,
                &request_id,
                "store_unavailable",
                None,
            );
        }
    }

    // Gate 3: rate limit.
    let decision = state.limiter.allow(&caller_id);
    if !decision.allowed {
        let retry_after_secs = decision
            .retry_after
            .map_or(0, |d| d.as_secs().max(1));
        audit(
            &state,
            AuditEventType::RateLimited,
            &caller_id,
            serde_json::json!({"request_id": request_id, "retry_after_secs": retry_after_secs}),
        )
        .await;
        kasuku_metrics::record_ingress_rejected("rate_limit");
        warn!(
            caller = %mask_caller(&caller_id),
            retry_after_secs,
            "caller rate limited"
        );
        return reject(
            StatusCode::TOO_MANY_REQUESTS,
            &request_id,
            "rate_limited",
            Some(retry_after_secs),
        );
    }

    // All gates passed: build the immutable envelope and enqueue it.
    let envelope = WebhookEnvelope {
        idempotency_key: derive_idempotency_key(channel, &event_id),
        event_id,
        received_at: chrono::Utc::now().to_rfc3339(),
        source_channel: channel,
        caller_id: caller_id.clone(),
        text,
        payload,
        signature_valid: check == kasuku_guard::SignatureCheck::Valid,
    };
    let serialized = match serde_json::to_string(&envelope) {
        Ok(serialized) => serialized,
        Err(e) => {
            warn!(error = %e, "failed to serialize envelope");
            return reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                &request_id,
                "internal",
                None,
            );
        }
    };

    match state
        .queue
        .enqueue(
            &state.options.inbound_topic,
            &serialized,
            state.options.max_attempts,
        )
        .await
    {
        Ok(entry_id) => {
            kasuku_metrics::record_ingress_accepted(&envelope.source_channel.to_string());
            info!(
                entry_id,
                channel = %envelope.source_channel,
                caller = %mask_caller(&caller_id),
                event_id = %envelope.event_id,
                "webhook event enqueued"
            );
            accept(&request_id)
        }
        Err(e) => {
            warn!(error = %e, "enqueue failed, failing closed");
            kasuku_metrics::record_ingress_rejected("store_unavailable");
            reject(
                StatusCode::SERVICE_UNAVAILABLE,
                &request_id,
                "store_unavailable",
                None,
            )
        }
    }
}

/// GET /webhook
///
/// Provider verification handshake: echo `hub.challenge` when the mode is
/// `subscribe` and the token matches, 403 otherwise.
pub async fn get_webhook(
    State(state): State<IngressState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    if let Some(expected) = &state.options.verify_token
        && params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref() == Some(expected.as_str())
    {
        return (StatusCode::OK, params.challenge.unwrap_or_default()).into_response();
    }
    (
        StatusCode::FORBIDDEN,
        Json(WebhookResponse {
            accepted: false,
            error: Some("forbidden".into()),
        }),
    )
        .into_response()
}

/// GET /health
///
/// Read-only: uptime and worker counters for external monitoring.
pub async fn get_health(State(state): State<IngressState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker: state.stats.snapshot(),
    })
}

/// GET /metrics
///
/// Prometheus text format when metrics are enabled.
pub async fn get_metrics(State(state): State<IngressState>) -> Response {
    match &state.prometheus_render {
        Some(render) => (StatusCode::OK, render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n").into_response(),
    }
}

/// Derive the ledger key for an event. Stable across redeliveries.
fn derive_idempotency_key(channel: SourceChannel, event_id: &str) -> String {
    format!("{channel}:{event_id}")
}

fn accept(request_id: &str) -> Response {
    with_request_id(
        (
            StatusCode::OK,
            Json(WebhookResponse {
                accepted: true,
                error: None,
            }),
        )
            .into_response(),
        request_id,
    )
}

fn reject(
    status: StatusCode,
    request_id: &str,
    error: &str,
    retry_after_secs: Option<u64>,
) -> Response {
    let mut response = (
        status,
        Json(WebhookResponse {
            accepted: false,
            error: Some(error.to_string()),
        }),
    )
        .into_response();
    if let Some(secs) = retry_after_secs
        && let Ok(value) = secs.to_string().parse()
    {
        response.headers_mut().insert("retry-after", value);
    }
    with_request_id(response, request_id)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Record an audit entry; failures are logged, never propagated -- the
/// rejection stands either way.
async fn audit(
    state: &IngressState,
    event_type: AuditEventType,
    caller_id: &str,
    details: serde_json::Value,
) {
    let entry = AuditEntry::new(event_type, caller_id, details);
    if let Err(e) = state.audit.record(&entry).await {
        warn!(error = %e, event_type = %event_type, "failed to record audit entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_response_omits_error_when_accepted() {
        let json = serde_json::to_string(&WebhookResponse {
            accepted: true,
            error: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"accepted":true}"#);
    }

    #[test]
    fn webhook_response_includes_error_when_rejected() {
        let json = serde_json::to_string(&WebhookResponse {
            accepted: false,
            error: Some("replay".into()),
        })
        .unwrap();
        assert!(json.contains("\"error\":\"replay\""));
    }

    #[test]
    fn verify_params_deserialize_from_hub_names() {
        let params: VerifyParams = serde_json::from_str(
            r#"{"hub.mode":"subscribe","hub.verify_token":"tok","hub.challenge":"1234"}"#,
        )
        .unwrap();
        assert_eq!(params.mode.as_deref(), Some("subscribe"));
        assert_eq!(params.verify_token.as_deref(), Some("tok"));
        assert_eq!(params.challenge.as_deref(), Some("1234"));
    }

    #[test]
    fn idempotency_key_is_channel_scoped() {
        assert_eq!(
            derive_idempotency_key(SourceChannel::Whatsapp, "wamid.1"),
            "whatsapp:wamid.1"
        );
        assert_eq!(derive_idempotency_key(SourceChannel::Sms, "s1"), "sms:s1");
    }
}
