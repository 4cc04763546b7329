// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as valid bind addresses, distinct topic names, and
//! nonzero retry budgets.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::KasukuConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &KasukuConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate ingress.host is not empty and looks like an IP or hostname.
    let host = config.ingress.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "ingress.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("ingress.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    // Validate database_path is not empty.
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Topic names must be non-empty and pairwise distinct -- routing a
    // dead-lettered message back onto the inbound topic would loop forever.
    let topics = [
        ("queue.inbound_topic", &config.queue.inbound_topic),
        ("queue.processed_topic", &config.queue.processed_topic),
        ("queue.dead_letter_topic", &config.queue.dead_letter_topic),
    ];
    let mut seen_topics = HashSet::new();
    for (key, topic) in &topics {
        if topic.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{key} must not be empty"),
            });
        } else if !seen_topics.insert(topic.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!("{key} duplicates another topic name (`{topic}`)"),
            });
        }
    }

    if config.queue.max_retries < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "queue.max_retries must be at least 1, got {}",
                config.queue.max_retries
            ),
        });
    }

    if config.queue.visibility_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.visibility_timeout_secs must be nonzero".to_string(),
        });
    }

    if config.worker.concurrent_messages == 0 {
        errors.push(ConfigError::Validation {
            message: "worker.concurrent_messages must be at least 1".to_string(),
        });
    }

    if config.worker.handler_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "worker.handler_timeout_secs must be nonzero".to_string(),
        });
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ConfigError::Validation {
            message: "rate_limit.max_requests must be at least 1".to_string(),
        });
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "rate_limit.window_secs must be nonzero".to_string(),
        });
    }

    if config.ingress.max_body_bytes < 1024 {
        errors.push(ConfigError::Validation {
            message: format!(
                "ingress.max_body_bytes must be at least 1024, got {}",
                config.ingress.max_body_bytes
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
