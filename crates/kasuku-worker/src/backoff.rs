// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry delay computation.

use std::time::Duration;

/// Ceiling for exponential delays.
const MAX_BACKOFF: Duration = Duration::from_secs(900);

/// Delay before the next delivery attempt.
///
/// `attempt` is the number of attempts already failed. Exponential mode
/// doubles the base delay per failed attempt, capped at 15 minutes; fixed
/// mode always returns the base delay.
pub fn retry_delay(attempt: i32, base_delay_ms: u64, exponential: bool) -> Duration {
    if !exponential {
        return Duration::from_millis(base_delay_ms);
    }
    let shift = attempt.clamp(0, 20) as u32;
    let millis = base_delay_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(millis).min(MAX_BACKOFF)
}
