// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Kasuku metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "kasuku_ingress_accepted_total",
        "Webhook events accepted and enqueued"
    );
    describe_counter!(
        "kasuku_ingress_rejected_total",
        "Webhook events rejected at an ingress gate"
    );
    describe_counter!("kasuku_processed_total", "Envelopes handled successfully");
    describe_counter!("kasuku_failed_total", "Envelope processing attempts that failed");
    describe_counter!(
        "kasuku_dead_lettered_total",
        "Envelopes moved to the dead-letter topic"
    );
    describe_counter!("kasuku_retried_total", "Envelopes requeued for retry");
    describe_gauge!("kasuku_in_flight", "Envelopes currently being processed");
    describe_histogram!(
        "kasuku_dispatch_latency_seconds",
        "Handler dispatch latency in seconds"
    );
}

/// Record an accepted webhook event.
pub fn record_ingress_accepted(channel: &str) {
    metrics::counter!("kasuku_ingress_accepted_total", "channel" => channel.to_string())
        .increment(1);
}

/// Record a rejected webhook event with the gate that rejected it.
pub fn record_ingress_rejected(reason: &str) {
    metrics::counter!("kasuku_ingress_rejected_total", "reason" => reason.to_string()).increment(1);
}

/// Record a successfully processed envelope.
pub fn record_processed(handler_id: &str) {
    metrics::counter!("kasuku_processed_total", "handler" => handler_id.to_string()).increment(1);
}

/// Record a failed processing attempt.
pub fn record_failed() {
    metrics::counter!("kasuku_failed_total").increment(1);
}

/// Record a dead-lettered envelope.
pub fn record_dead_lettered() {
    metrics::counter!("kasuku_dead_lettered_total").increment(1);
}

/// Record a retry requeue.
pub fn record_retried() {
    metrics::counter!("kasuku_retried_total").increment(1);
}

/// Set the number of envelopes currently in flight.
pub fn set_in_flight(count: f64) {
    metrics::gauge!("kasuku_in_flight").set(count);
}

/// Record handler dispatch latency.
pub fn record_dispatch_latency(seconds: f64) {
    metrics::histogram!("kasuku_dispatch_latency_seconds").record(seconds);
}
