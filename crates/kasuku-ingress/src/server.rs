// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state. The endpoint holds no
//! business logic: accepted events are enqueued and the provider gets an
//! immediate acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use kasuku_core::{AuditStore, KasukuError, MessageQueue, NonceStore, RateLimitStore, WorkerStats};
use kasuku_guard::SignatureVerifier;

use crate::handlers;

/// Runtime knobs the handlers need, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct IngressOptions {
    /// Header carrying the HMAC signature.
    pub signature_header: String,
    /// Token for the provider verification handshake; `None` disables it.
    pub verify_token: Option<String>,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Topic accepted envelopes are published to.
    pub inbound_topic: String,
    /// Retry budget stamped onto enqueued envelopes.
    pub max_attempts: i32,
    /// Replay-guard nonce TTL.
    pub nonce_ttl: Duration,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct IngressState {
    /// Signature gate.
    pub verifier: SignatureVerifier,
    /// Replay gate.
    pub nonces: Arc<dyn NonceStore>,
    /// Rate-limit gate.
    pub limiter: Arc<dyn RateLimitStore>,
    /// Security audit sink.
    pub audit: Arc<dyn AuditStore>,
    /// Durable queue the endpoint publishes to.
    pub queue: Arc<dyn MessageQueue>,
    /// Worker counters surfaced through /health.
    pub stats: Arc<WorkerStats>,
    /// Resolved runtime options.
    pub options: IngressOptions,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the ingress router.
///
/// Routes:
/// - POST /webhook (guarded ingress)
/// - GET  /webhook (provider verification handshake)
/// - GET  /health  (uptime + worker counters, unauthenticated)
/// - GET  /metrics (Prometheus text format, unauthenticated)
pub fn app(state: IngressState) -> Router {
    let body_limit = state.options.max_body_bytes;
    Router::new()
        .route(
            "/webhook",
            post(handlers::post_webhook).get(handlers::get_webhook),
        )
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the ingress HTTP server and serve until cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: IngressState,
    cancel: CancellationToken,
) -> Result<(), KasukuError> {
    let router = app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KasukuError::Internal(format!("failed to bind ingress to {addr}: {e}")))?;

    tracing::info!("ingress server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| KasukuError::Internal(format!("ingress server error: {e}")))?;

    Ok(())
}
