// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kasuku serve` command implementation.
//!
//! Wires the full pipeline: SQLite store, ingress guards, conversation
//! router, idempotency ledger, worker pool, Prometheus metrics, and the
//! maintenance sweep, then serves until SIGTERM/SIGINT with a graceful
//! drain.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kasuku_config::model::KasukuConfig;
use kasuku_core::{
    AuditStore, ConversationStore, IdempotencyStore, KasukuError, MessageQueue, NonceStore,
    RateLimitStore, WorkerStats,
};
use kasuku_guard::{MemoryRateLimiter, SignatureVerifier};
use kasuku_ingress::{IngressOptions, IngressState, ServerConfig, start_server};
use kasuku_metrics::PrometheusAdapter;
use kasuku_router::{ConversationRouter, HandlerRegistry, HomeMenuHandler};
use kasuku_storage::SqliteStore;
use kasuku_worker::{IdempotencyLedger, WorkerPool};

/// How long completed queue rows are kept before the sweep prunes them.
const COMPLETED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs the `kasuku serve` command.
///
/// Starts the ingress HTTP server and the worker pool against one shared
/// SQLite store. Supports graceful shutdown via signal handlers: the server
/// stops accepting, the pool drains in-flight envelopes, and the store is
/// checkpointed before exit.
pub async fn run_serve(config: KasukuConfig) -> Result<(), KasukuError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting kasuku serve");

    // Storage first: everything else hangs off the shared store.
    let store = Arc::new(SqliteStore::open(&config.storage).await?);

    // Prometheus metrics (if enabled).
    let prometheus = if config.metrics.enabled {
        match PrometheusAdapter::new() {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };
    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        prometheus.as_ref().map(|adapter| {
            let handle = adapter.handle().clone();
            Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>
        });

    let stats = Arc::new(WorkerStats::new());

    // Ingress guards.
    let verifier = SignatureVerifier::new(
        config.webhook.app_secret.as_deref(),
        config.webhook.allow_unsigned,
    );
    let limiter = Arc::new(MemoryRateLimiter::new(
        config.rate_limit.max_requests,
        Duration::from_secs(config.rate_limit.window_secs),
        config.rate_limit.max_entries,
    ));

    // Handler registry: the built-in home flow plus whatever domain flows
    // the deployment registers. Domain handlers live outside this core.
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(HomeMenuHandler));
    info!(flows = registry.len(), "handler registry initialized");

    let router = Arc::new(ConversationRouter::new(
        registry,
        store.clone() as Arc<dyn ConversationStore>,
        Duration::from_secs(config.worker.handler_timeout_secs),
    ));

    let ledger = IdempotencyLedger::new(
        store.clone() as Arc<dyn IdempotencyStore>,
        Duration::from_secs(config.idempotency.ttl_secs),
    );
    let pool = Arc::new(WorkerPool::new(
        store.clone() as Arc<dyn MessageQueue>,
        ledger,
        router,
        stats.clone(),
        config.queue.clone(),
        config.worker.clone(),
    ));

    let state = IngressState {
        verifier,
        nonces: store.clone() as Arc<dyn NonceStore>,
        limiter: limiter as Arc<dyn RateLimitStore>,
        audit: store.clone() as Arc<dyn AuditStore>,
        queue: store.clone() as Arc<dyn MessageQueue>,
        stats: stats.clone(),
        options: IngressOptions {
            signature_header: config.ingress.signature_header.clone(),
            verify_token: config.ingress.verify_token.clone(),
            max_body_bytes: config.ingress.max_body_bytes,
            inbound_topic: config.queue.inbound_topic.clone(),
            max_attempts: config.queue.max_retries,
            nonce_ttl: Duration::from_secs(config.nonce.ttl_secs),
        },
        prometheus_render,
    };
    let server_config = ServerConfig {
        host: config.ingress.host.clone(),
        port: config.ingress.port,
    };

    // Install signal handler.
    let cancel = install_signal_handler();

    // Maintenance sweep: expired nonces/idempotency rows and old completed
    // queue entries. The guards themselves never reap.
    {
        let sweep_store = store.clone();
        let sweep_cancel = cancel.clone();
        let sweep_interval = Duration::from_secs(config.maintenance.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            // Skip the first immediate tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match sweep_store.run_maintenance(COMPLETED_RETENTION).await {
                            Ok(removed) if removed > 0 => {
                                debug!(removed, "maintenance sweep completed");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "maintenance sweep failed (non-fatal)");
                            }
                        }
                    }
                    _ = sweep_cancel.cancelled() => {
                        info!("maintenance sweep shutting down");
                        break;
                    }
                }
            }
        });
        info!(
            interval_secs = config.maintenance.sweep_interval_secs,
            "maintenance sweep started"
        );
    }

    // Worker pool in the background; ingress server in the foreground.
    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move { pool.run(pool_cancel).await });

    start_server(&server_config, state, cancel.clone()).await?;

    // Server returned: shutdown is in progress. Wait for the pool drain.
    cancel.cancel();
    if let Err(e) = pool_handle.await {
        warn!(error = %e, "worker pool task panicked during shutdown");
    }

    store.close().await?;
    info!("kasuku serve shutdown complete");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received. The handler task runs in the background until then.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
                warn!("failed to install SIGTERM handler, relying on Ctrl+C only");
                let _ = ctrl_c.await;
                token_clone.cancel();
                return;
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kasuku={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
