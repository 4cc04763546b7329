// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory per-caller rate limiting with lockout.
//!
//! Window counter: the first request from an identifier starts a window,
//! subsequent requests increment it, and exceeding the ceiling locks the
//! identifier out for a full window regardless of when the window would
//! naturally reset. State is ephemeral -- a restart clears all counters and
//! fails open, which is acceptable for abuse mitigation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use kasuku_core::{RateDecision, RateLimitStore};

/// Sweep expired entries every N calls.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    window_start: Instant,
    count: u32,
    locked_until: Option<Instant>,
}

/// Bounded in-memory rate limiter keyed by caller identity.
pub struct MemoryRateLimiter {
    entries: DashMap<String, CounterEntry>,
    max_requests: u32,
    window: Duration,
    max_entries: usize,
    calls: AtomicU64,
}

impl MemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
            max_entries,
            calls: AtomicU64::new(0),
        }
    }

    /// Drop entries whose window and lock have both long expired.
    fn sweep(&self, now: Instant) {
        self.entries.retain(|_, entry| {
            let lock_live = entry.locked_until.is_some_and(|until| now < until);
            let window_live = now.duration_since(entry.window_start) < self.window * 2;
            lock_live || window_live
        });
    }

    fn maybe_sweep(&self, now: Instant) {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % SWEEP_EVERY == 0 || self.entries.len() >= self.max_entries {
            self.sweep(now);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.entries.len()
    }
}

impl RateLimitStore for MemoryRateLimiter {
    fn allow(&self, identifier: &str) -> RateDecision {
        let now = Instant::now();
        self.maybe_sweep(now);

        // Memory cap: when full and this caller is untracked, fail open
        // rather than evicting a live counter for an active abuser.
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(identifier) {
            tracing::warn!(
                tracked = self.entries.len(),
                "rate limiter at capacity, admitting untracked caller"
            );
            return RateDecision {
                allowed: true,
                remaining: self.max_requests.saturating_sub(1),
                retry_after: None,
            };
        }

        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert(CounterEntry {
                window_start: now,
                count: 0,
                locked_until: None,
            });

        if let Some(until) = entry.locked_until {
            if now < until {
                return RateDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after: Some(until - now),
                };
            }
            // Lock expired: start a fresh window.
            entry.locked_until = None;
            entry.window_start = now;
            entry.count = 0;
        }

        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;
        if entry.count > self.max_requests {
            entry.locked_until = Some(now + self.window);
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after: Some(self.window),
            };
        }

        RateDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            retry_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_request_allowed_next_rejected() {
        let limiter = MemoryRateLimiter::new(5, Duration::from_secs(900), 100);

        for i in 1..=5 {
            let decision = limiter.allow("+250788000001");
            assert!(decision.allowed, "request {i} within ceiling should pass");
            assert_eq!(decision.remaining, 5 - i);
        }

        let sixth = limiter.allow("+250788000001");
        assert!(!sixth.allowed);
        assert!(sixth.retry_after.is_some_and(|d| d > Duration::ZERO));
    }

    #[test]
    fn lockout_persists_across_further_requests() {
        let limiter = MemoryRateLimiter::new(2, Duration::from_secs(60), 100);
        limiter.allow("caller");
        limiter.allow("caller");
        assert!(!limiter.allow("caller").allowed);

        // Still locked; retry_after keeps reporting the lock.
        let again = limiter.allow("caller");
        assert!(!again.allowed);
        assert!(again.retry_after.is_some());
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = MemoryRateLimiter::new(1, Duration::from_secs(60), 100);
        assert!(limiter.allow("alice").allowed);
        assert!(!limiter.allow("alice").allowed);
        assert!(limiter.allow("bob").allowed);
    }

    #[test]
    fn lock_expiry_readmits_caller() {
        let limiter = MemoryRateLimiter::new(1, Duration::from_millis(30), 100);
        assert!(limiter.allow("caller").allowed);
        assert!(!limiter.allow("caller").allowed);

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow("caller").allowed, "lock should have expired");
    }

    #[test]
    fn window_reset_clears_count_without_lock() {
        let limiter = MemoryRateLimiter::new(2, Duration::from_millis(30), 100);
        assert!(limiter.allow("caller").allowed);
        assert!(limiter.allow("caller").allowed);

        std::thread::sleep(Duration::from_millis(40));
        // New window: counter starts over, no lock was ever set.
        let decision = limiter.allow("caller");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn capacity_fails_open_for_untracked_callers() {
        let limiter = MemoryRateLimiter::new(1, Duration::from_secs(600), 2);
        assert!(limiter.allow("a").allowed);
        assert!(limiter.allow("b").allowed);
        // Map is full with live entries; a new caller is admitted, not evicted in.
        assert!(limiter.allow("c").allowed);
        assert!(limiter.tracked() <= 2);
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let limiter = MemoryRateLimiter::new(5, Duration::from_millis(10), 100);
        limiter.allow("stale");
        std::thread::sleep(Duration::from_millis(30));
        limiter.sweep(Instant::now());
        assert_eq!(limiter.tracked(), 0);
    }
}
