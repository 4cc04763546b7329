// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Kasuku configuration system.

use kasuku_config::diagnostic::{ConfigError, suggest_key};
use kasuku_config::model::KasukuConfig;
use kasuku_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_kasuku_config() {
    let toml = r#"
[service]
name = "kasuku-test"
log_level = "debug"

[ingress]
host = "0.0.0.0"
port = 9090
signature_header = "x-hub-signature-256"
verify_token = "verify-me"
max_body_bytes = 262144

[webhook]
app_secret = "shh-secret"
allow_unsigned = false

[queue]
inbound_topic = "inbound"
processed_topic = "processed"
dead_letter_topic = "dlq"
max_retries = 5
retry_delay_ms = 1500
exponential_backoff = false
visibility_timeout_secs = 120

[worker]
concurrent_messages = 16
handler_timeout_secs = 10

[rate_limit]
max_requests = 100
window_secs = 60

[storage]
database_path = "/tmp/kasuku-test.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "kasuku-test");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.ingress.host, "0.0.0.0");
    assert_eq!(config.ingress.port, 9090);
    assert_eq!(config.ingress.verify_token.as_deref(), Some("verify-me"));
    assert_eq!(config.ingress.max_body_bytes, 262_144);
    assert_eq!(config.webhook.app_secret.as_deref(), Some("shh-secret"));
    assert!(!config.webhook.allow_unsigned);
    assert_eq!(config.queue.inbound_topic, "inbound");
    assert_eq!(config.queue.max_retries, 5);
    assert_eq!(config.queue.retry_delay_ms, 1500);
    assert!(!config.queue.exponential_backoff);
    assert_eq!(config.queue.visibility_timeout_secs, 120);
    assert_eq!(config.worker.concurrent_messages, 16);
    assert_eq!(config.worker.handler_timeout_secs, 10);
    assert_eq!(config.rate_limit.max_requests, 100);
    assert_eq!(config.storage.database_path, "/tmp/kasuku-test.db");
    assert!(!config.storage.wal_mode);
}

/// Unknown field in [webhook] section produces an UnknownField error.
#[test]
fn unknown_field_in_webhook_produces_error() {
    let toml = r#"
[webhook]
app_secert = "typo"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("app_secert"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let toml = "";
    let config = load_config_from_str(toml).expect("empty TOML should use defaults");

    assert_eq!(config.service.name, "kasuku");
    assert_eq!(config.service.log_level, "info");
    assert_eq!(config.ingress.host, "127.0.0.1");
    assert_eq!(config.ingress.port, 8080);
    assert_eq!(config.ingress.signature_header, "x-hub-signature-256");
    assert!(config.ingress.verify_token.is_none());
    assert!(config.webhook.app_secret.is_none());
    assert!(!config.webhook.allow_unsigned, "unsigned must default to off");
    assert_eq!(config.queue.inbound_topic, "wa_inbound");
    assert_eq!(config.queue.processed_topic, "wa_processed");
    assert_eq!(config.queue.dead_letter_topic, "wa_dlq");
    assert_eq!(config.queue.max_retries, 3);
    assert!(config.queue.exponential_backoff);
    assert_eq!(config.worker.concurrent_messages, 10);
    assert_eq!(config.nonce.ttl_secs, 86_400);
    assert_eq!(config.idempotency.ttl_secs, 86_400);
    assert_eq!(config.rate_limit.max_requests, 30);
    assert_eq!(config.storage.database_path, "kasuku.db");
    assert!(config.storage.wal_mode);
    assert!(config.metrics.enabled);
}

/// Env-style overrides map section_key to section.key.
#[test]
fn override_maps_to_queue_section() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let toml_content = r#"
[queue]
max_retries = 3
"#;

    let config: KasukuConfig = Figment::new()
        .merge(Serialized::defaults(KasukuConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("queue.max_retries", 7))
        .extract()
        .expect("should merge override");

    assert_eq!(config.queue.max_retries, 7);
}

/// load_and_validate_str surfaces validation errors for semantically bad values.
#[test]
fn validate_str_rejects_duplicate_topics() {
    let toml = r#"
[queue]
inbound_topic = "same"
dead_letter_topic = "same"
"#;

    let errors = load_and_validate_str(toml).expect_err("duplicate topics should fail");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("duplicates"))
    ));
}

/// Typo suggestions surface through the diagnostic path.
#[test]
fn suggestion_for_known_section_keys() {
    let valid = &[
        "inbound_topic",
        "processed_topic",
        "dead_letter_topic",
        "max_retries",
        "retry_delay_ms",
    ];
    assert_eq!(
        suggest_key("inbound_topc", valid),
        Some("inbound_topic".to_string())
    );
}

/// A fully-defaulted config passes validation end to end.
#[test]
fn default_config_is_valid() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.service.name, "kasuku");
}
