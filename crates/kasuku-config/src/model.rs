// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Kasuku webhook platform.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Kasuku configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values -- except that a deployment without `webhook.app_secret` refuses
/// signed traffic unless `webhook.allow_unsigned` is explicitly enabled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KasukuConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP ingress endpoint settings.
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Webhook authentication settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Delivery queue topics and retry policy.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker pool concurrency and timeouts.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Replay-guard nonce settings.
    #[serde(default)]
    pub nonce: NonceConfig,

    /// Idempotency ledger settings.
    #[serde(default)]
    pub idempotency: IdempotencyConfig,

    /// Per-caller rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Background maintenance sweeps.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "kasuku".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP ingress endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Header carrying the HMAC signature (provider-configurable).
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Token echoed during the provider verification handshake (GET /webhook).
    /// `None` disables the handshake route.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            signature_header: default_signature_header(),
            verify_token: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_signature_header() -> String {
    "x-hub-signature-256".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Shared secret for HMAC-SHA256 signature verification.
    /// `None` means no signed traffic can be accepted.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Accept unsigned requests (trusted internal forwarding only).
    ///
    /// This is a sharp, explicitly-logged mode: it must never be enabled as
    /// a convenience fallback. Defaults to disabled.
    #[serde(default)]
    pub allow_unsigned: bool,
}

/// Delivery queue topics and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Topic the ingress publishes accepted envelopes to.
    #[serde(default = "default_inbound_topic")]
    pub inbound_topic: String,

    /// Topic for successfully handled envelopes.
    #[serde(default = "default_processed_topic")]
    pub processed_topic: String,

    /// Topic for envelopes that exhausted their retry budget.
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,

    /// Maximum delivery attempts before dead-lettering.
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    /// Base retry delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Double the delay on each attempt (capped) instead of a fixed delay.
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,

    /// How long a dequeued entry stays invisible before redelivery.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbound_topic: default_inbound_topic(),
            processed_topic: default_processed_topic(),
            dead_letter_topic: default_dead_letter_topic(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: default_true(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

fn default_inbound_topic() -> String {
    "wa_inbound".to_string()
}

fn default_processed_topic() -> String {
    "wa_processed".to_string()
}

fn default_dead_letter_topic() -> String {
    "wa_dlq".to_string()
}

fn default_max_retries() -> i32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Concurrency ceiling: maximum envelopes in flight at once.
    #[serde(default = "default_concurrent_messages")]
    pub concurrent_messages: usize,

    /// Idle polling interval when the queue is empty, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline enforced around each domain handler invocation.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Grace period for in-flight messages during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrent_messages: default_concurrent_messages(),
            poll_interval_ms: default_poll_interval_ms(),
            handler_timeout_secs: default_handler_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_concurrent_messages() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    20
}

/// Replay-guard nonce configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NonceConfig {
    /// How long a nonce blocks replays, in seconds.
    #[serde(default = "default_nonce_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_nonce_ttl_secs(),
        }
    }
}

fn default_nonce_ttl_secs() -> u64 {
    86_400
}

/// Idempotency ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IdempotencyConfig {
    /// How long a stored result satisfies repeated keys, in seconds.
    #[serde(default = "default_idempotency_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_idempotency_ttl_secs(),
        }
    }
}

fn default_idempotency_ttl_secs() -> u64 {
    86_400
}

/// Per-caller rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per caller per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds. Exceeding the ceiling locks the caller out
    /// for this long, independent of the window's natural reset.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Upper bound on tracked caller identities (memory cap).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_requests() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_entries() -> usize {
    10_000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_true(),
        }
    }
}

fn default_database_path() -> String {
    "kasuku.db".to_string()
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and expose GET /metrics.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Interval between expired-row sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    300
}
