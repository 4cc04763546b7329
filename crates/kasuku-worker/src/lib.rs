// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker pool for the Kasuku webhook platform.
//!
//! Consumes envelopes from the inbound topic with bounded concurrency,
//! wraps every dispatch in the idempotency ledger, publishes results to the
//! processed topic, and dead-letters envelopes that exhaust their retry
//! budget or fail permanently.

pub mod backoff;
pub mod ledger;
pub mod pool;

pub use backoff::retry_delay;
pub use ledger::IdempotencyLedger;
pub use pool::WorkerPool;
