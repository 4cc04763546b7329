// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker pool: bounded-concurrency consumer with retry and
//! dead-lettering.
//!
//! A semaphore caps in-flight envelopes at the configured ceiling no matter
//! how many entries the queue holds; excess work waits for a free slot. Each
//! message is processed in isolation -- one poisoned envelope can never
//! crash the pool or block other slots. On cancellation the pool stops
//! pulling, drains in-flight work within the grace period, and abandons the
//! rest to queue redelivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kasuku_config::model::{QueueConfig, WorkerConfig};
use kasuku_core::{
    DeadLetterRecord, DispatchOutcome, KasukuError, MessageQueue, ProcessedRecord, QueueEntry,
    WebhookEnvelope, WorkerStats,
};
use kasuku_router::ConversationRouter;

use crate::backoff::retry_delay;
use crate::ledger::IdempotencyLedger;

/// Everything one in-flight message needs, cloneable into its task.
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<dyn MessageQueue>,
    ledger: IdempotencyLedger,
    router: Arc<ConversationRouter>,
    stats: Arc<WorkerStats>,
    queue_cfg: QueueConfig,
}

/// Long-running consumer over the inbound topic.
pub struct WorkerPool {
    ctx: WorkerContext,
    worker_cfg: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        ledger: IdempotencyLedger,
        router: Arc<ConversationRouter>,
        stats: Arc<WorkerStats>,
        queue_cfg: QueueConfig,
        worker_cfg: WorkerConfig,
    ) -> Self {
        Self {
            ctx: WorkerContext {
                queue,
                ledger,
                router,
                stats,
                queue_cfg,
            },
            worker_cfg,
        }
    }

    /// Consume until cancelled, then drain.
    pub async fn run(&self, cancel: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.worker_cfg.concurrent_messages));
        let poll_interval = Duration::from_millis(self.worker_cfg.poll_interval_ms);
        let visibility = Duration::from_secs(self.ctx.queue_cfg.visibility_timeout_secs);
        let mut tasks = JoinSet::new();

        info!(
            topic = %self.ctx.queue_cfg.inbound_topic,
            concurrency = self.worker_cfg.concurrent_messages,
            "worker pool started"
        );

        loop {
            // Reap finished tasks so the set does not grow unbounded.
            while tasks.try_join_next().is_some() {}

            // A slot must be free before we pull more work: the concurrency
            // ceiling holds even if the queue has a large backlog.
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    permit
                }
            };

            let dequeued = tokio::select! {
                _ = cancel.cancelled() => {
                    drop(permit);
                    break;
                }
                result = self.ctx.queue.dequeue(&self.ctx.queue_cfg.inbound_topic, visibility) => result,
            };

            match dequeued {
                Ok(Some(entry)) => {
                    let ctx = self.ctx.clone();
                    tasks.spawn(async move {
                        ctx.process(entry).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    warn!(error = %e, "dequeue failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        // Drain: let in-flight messages finish within the grace period, then
        // abandon the rest -- the visibility timeout redelivers them.
        let grace = Duration::from_secs(self.worker_cfg.shutdown_grace_secs);
        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(in_flight, grace_secs = grace.as_secs(), "draining worker pool");
        }
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "grace period elapsed, abandoning in-flight messages for redelivery"
            );
            tasks.shutdown().await;
        }

        info!("worker pool stopped");
    }
}

impl WorkerContext {
    /// Process one claimed queue entry end to end.
    async fn process(&self, entry: QueueEntry) {
        self.stats.task_started();
        kasuku_metrics::set_in_flight(self.stats.in_flight() as f64);
        let started = Instant::now();

        let result = self.dispatch_entry(&entry).await;
        kasuku_metrics::record_dispatch_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => self.publish_processed(&entry, outcome).await,
            Err(e) => self.handle_failure(&entry, e).await,
        }

        self.stats.task_finished();
        kasuku_metrics::set_in_flight(self.stats.in_flight() as f64);
    }

    /// Parse the envelope and run the ledger-wrapped router dispatch.
    async fn dispatch_entry(&self, entry: &QueueEntry) -> Result<DispatchOutcome, KasukuError> {
        let envelope: WebhookEnvelope = serde_json::from_str(&entry.payload)
            .map_err(|e| KasukuError::InvalidPayload(format!("undecodable envelope: {e}")))?;

        let router = self.router.clone();
        let dispatch_envelope = envelope.clone();
        self.ledger
            .get_or_compute(&envelope.idempotency_key, move || async move {
                router.dispatch(&dispatch_envelope).await
            })
            .await
    }

    async fn publish_processed(&self, entry: &QueueEntry, outcome: DispatchOutcome) {
        let envelope: Option<WebhookEnvelope> = serde_json::from_str(&entry.payload).ok();
        let Some(envelope) = envelope else {
            // Unreachable in practice: dispatch already parsed this payload.
            error!(entry_id = entry.id, "processed entry became unparseable");
            return;
        };

        let next_state_summary = outcome
            .next_state
            .current_flow
            .clone()
            .map_or_else(|| "idle".to_string(), |flow| format!("flow={flow}"));

        let record = ProcessedRecord {
            envelope,
            handler_id: outcome.handler_id.clone(),
            next_state_summary,
        };

        let payload = match serde_json::to_string(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to serialize processed record");
                return;
            }
        };

        // Publish then ack. A crash between the two duplicates the
        // processed record, consistent with at-least-once delivery.
        if let Err(e) = self
            .queue
            .enqueue(&self.queue_cfg.processed_topic, &payload, 1)
            .await
        {
            error!(error = %e, entry_id = entry.id, "failed to publish processed record, leaving entry for redelivery");
            return;
        }
        if let Err(e) = self.queue.ack(entry.id).await {
            error!(error = %e, entry_id = entry.id, "failed to ack processed entry");
            return;
        }

        self.stats.record_processed();
        kasuku_metrics::record_processed(&outcome.handler_id);
        debug!(entry_id = entry.id, handler = %outcome.handler_id, "envelope processed");
    }

    async fn handle_failure(&self, entry: &QueueEntry, error: KasukuError) {
        self.stats.record_failed();
        kasuku_metrics::record_failed();

        let attempts_done = entry.attempts + 1;

        // Permanent failures skip the retry budget: retrying cannot help.
        if error.is_permanent() || attempts_done >= entry.max_attempts {
            self.dead_letter(entry, &error, attempts_done).await;
            return;
        }

        let delay = retry_delay(
            entry.attempts,
            self.queue_cfg.retry_delay_ms,
            self.queue_cfg.exponential_backoff,
        );
        warn!(
            entry_id = entry.id,
            attempt = attempts_done,
            max_attempts = entry.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "processing failed, scheduling retry"
        );
        if let Err(e) = self.queue.fail(entry.id, &error.to_string(), delay).await {
            error!(error = %e, entry_id = entry.id, "failed to requeue entry, leaving claim to expire");
            return;
        }
        self.stats.record_retried();
        kasuku_metrics::record_retried();
    }

    async fn dead_letter(&self, entry: &QueueEntry, error: &KasukuError, attempts: i32) {
        let payload = serde_json::from_str(&entry.payload)
            .unwrap_or_else(|_| serde_json::Value::String(entry.payload.clone()));
        let record = DeadLetterRecord {
            payload,
            last_error: error.to_string(),
            attempts,
        };
        let serialized = match serde_json::to_string(&record) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!(error = %e, entry_id = entry.id, "failed to serialize dead-letter record");
                return;
            }
        };

        error!(
            entry_id = entry.id,
            attempts,
            error = %error,
            "moving envelope to dead-letter topic"
        );
        if let Err(e) = self
            .queue
            .enqueue(&self.queue_cfg.dead_letter_topic, &serialized, 1)
            .await
        {
            error!(error = %e, entry_id = entry.id, "failed to publish dead-letter record, leaving entry for redelivery");
            return;
        }
        if let Err(e) = self.queue.ack(entry.id).await {
            error!(error = %e, entry_id = entry.id, "failed to ack dead-lettered entry");
            return;
        }

        self.stats.record_dead_lettered();
        kasuku_metrics::record_dead_lettered();
    }
}
