// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress guards for the Kasuku webhook platform.
//!
//! Two of the four ingress gates live here: HMAC signature verification and
//! per-caller rate limiting. The nonce/replay guard and the audit log are
//! storage-backed and injected via the kasuku-core store traits.

pub mod ratelimit;
pub mod signature;

pub use ratelimit::MemoryRateLimiter;
pub use signature::{SignatureCheck, SignatureVerifier, sign_payload};
