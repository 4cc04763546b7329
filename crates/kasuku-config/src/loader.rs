// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./kasuku.toml` > `~/.config/kasuku/kasuku.toml` > `/etc/kasuku/kasuku.toml`
//! with environment variable overrides via `KASUKU_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::KasukuConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/kasuku/kasuku.toml` (system-wide)
/// 3. `~/.config/kasuku/kasuku.toml` (user XDG config)
/// 4. `./kasuku.toml` (local directory)
/// 5. `KASUKU_*` environment variables
pub fn load_config() -> Result<KasukuConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KasukuConfig::default()))
        .merge(Toml::file("/etc/kasuku/kasuku.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("kasuku/kasuku.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("kasuku.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<KasukuConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KasukuConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KasukuConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KasukuConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `KASUKU_QUEUE_RETRY_DELAY_MS`
/// must map to `queue.retry_delay_ms`, not `queue.retry.delay.ms`.
fn env_provider() -> Env {
    Env::prefixed("KASUKU_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: KASUKU_QUEUE_MAX_RETRIES -> "queue_max_retries"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("ingress_", "ingress.", 1)
            .replacen("webhook_", "webhook.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("worker_", "worker.", 1)
            .replacen("nonce_", "nonce.", 1)
            .replacen("idempotency_", "idempotency.", 1)
            .replacen("rate_limit_", "rate_limit.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("metrics_", "metrics.", 1)
            .replacen("maintenance_", "maintenance.", 1);
        mapped.into()
    })
}
