// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete pipeline -- temp SQLite store,
//! guards, ingress router, idempotency ledger, conversation router, worker
//! pool -- with mock domain handlers. Drive it with signed HTTP requests via
//! the axum router and a spawned worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use tokio_util::sync::CancellationToken;

use kasuku_config::model::{QueueConfig, StorageConfig, WorkerConfig};
use kasuku_core::{
    AuditStore, ConversationStore, DomainHandler, IdempotencyStore, KasukuError, MessageQueue,
    NonceStore, RateLimitStore, WorkerStats,
};
use kasuku_guard::{MemoryRateLimiter, SignatureVerifier, sign_payload};
use kasuku_ingress::{IngressOptions, IngressState, app};
use kasuku_router::{ConversationRouter, HandlerRegistry, HomeMenuHandler};
use kasuku_storage::SqliteStore;
use kasuku_worker::{IdempotencyLedger, WorkerPool};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    secret: String,
    handlers: Vec<Arc<dyn DomainHandler>>,
    rate_limit: u32,
    concurrency: usize,
    max_retries: i32,
    handler_timeout: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            secret: "test-app-secret".to_string(),
            handlers: Vec::new(),
            rate_limit: 1000,
            concurrency: 4,
            max_retries: 3,
            handler_timeout: Duration::from_secs(5),
        }
    }

    /// Register a domain handler (keyed by its own flow id).
    pub fn with_handler(mut self, handler: Arc<dyn DomainHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Set the per-caller rate-limit ceiling.
    pub fn with_rate_limit(mut self, max_requests: u32) -> Self {
        self.rate_limit = max_requests;
        self
    }

    /// Set the worker concurrency ceiling.
    pub fn with_concurrency(mut self, concurrent_messages: usize) -> Self {
        self.concurrency = concurrent_messages;
        self
    }

    /// Set the retry budget stamped onto enqueued envelopes.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the router's handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, KasukuError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| KasukuError::Storage {
            source: e.into(),
        })?;
        let db_path = temp_dir.path().join("test.db");

        let store = Arc::new(
            SqliteStore::open(&StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            })
            .await?,
        );

        let queue_cfg = QueueConfig {
            max_retries: self.max_retries,
            retry_delay_ms: 0,
            exponential_backoff: false,
            ..QueueConfig::default()
        };
        let worker_cfg = WorkerConfig {
            concurrent_messages: self.concurrency,
            poll_interval_ms: 10,
            handler_timeout_secs: self.handler_timeout.as_secs().max(1),
            shutdown_grace_secs: 5,
        };

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(HomeMenuHandler));
        for handler in self.handlers {
            registry.register(handler);
        }
        let router = Arc::new(ConversationRouter::new(
            registry,
            store.clone() as Arc<dyn ConversationStore>,
            self.handler_timeout,
        ));

        let stats = Arc::new(WorkerStats::new());
        let ledger = IdempotencyLedger::new(
            store.clone() as Arc<dyn IdempotencyStore>,
            Duration::from_secs(3600),
        );
        let pool = Arc::new(WorkerPool::new(
            store.clone() as Arc<dyn MessageQueue>,
            ledger,
            router,
            stats.clone(),
            queue_cfg.clone(),
            worker_cfg,
        ));

        let state = IngressState {
            verifier: SignatureVerifier::new(Some(&self.secret), false),
            nonces: store.clone() as Arc<dyn NonceStore>,
            limiter: Arc::new(MemoryRateLimiter::new(
                self.rate_limit,
                Duration::from_secs(900),
                10_000,
            )) as Arc<dyn RateLimitStore>,
            audit: store.clone() as Arc<dyn AuditStore>,
            queue: store.clone() as Arc<dyn MessageQueue>,
            stats: stats.clone(),
            options: IngressOptions {
                signature_header: "x-hub-signature-256".into(),
                verify_token: Some("harness-verify".into()),
                max_body_bytes: 256 * 1024,
                inbound_topic: queue_cfg.inbound_topic.clone(),
                max_attempts: self.max_retries,
                nonce_ttl: Duration::from_secs(3600),
            },
            prometheus_render: None,
        };

        Ok(TestHarness {
            router: app(state),
            store,
            pool,
            stats,
            queue_cfg,
            secret: self.secret,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment over a temp SQLite database.
pub struct TestHarness {
    /// The ingress axum router, drivable with `tower::ServiceExt::oneshot`.
    pub router: Router,
    /// The shared store backing every trait.
    pub store: Arc<SqliteStore>,
    /// The worker pool (not running until [`TestHarness::spawn_worker`]).
    pub pool: Arc<WorkerPool>,
    /// Worker counters.
    pub stats: Arc<WorkerStats>,
    /// Queue topics/retry policy the harness was built with.
    pub queue_cfg: QueueConfig,
    secret: String,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A POST /webhook request correctly signed with the harness secret.
    pub fn signed_request(&self, body: &str) -> Request<Body> {
        let signature = sign_payload(self.secret.as_bytes(), body.as_bytes());
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-hub-signature-256", signature)
            .body(Body::from(body.to_string()))
            .expect("request builder")
    }

    /// A WhatsApp text-message webhook body.
    pub fn whatsapp_body(message_id: &str, from: &str, text: &str) -> String {
        serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"value": {"messages": [{
                "id": message_id,
                "from": from,
                "type": "text",
                "text": {"body": text}
            }]}}]}]
        })
        .to_string()
    }

    /// Run the worker pool in the background until the token is cancelled.
    pub fn spawn_worker(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = self.pool.clone();
        tokio::spawn(async move { pool.run(cancel).await })
    }

    /// Poll the worker counters until `done` or the timeout elapses.
    pub async fn wait_until<F: Fn(&WorkerStats) -> bool>(
        &self,
        timeout: Duration,
        done: F,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done(&self.stats) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
