// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP webhook ingress for the Kasuku platform.
//!
//! A thin axum entry point that authenticates, deduplicates, rate-limits,
//! and decodes inbound webhook calls, then enqueues a normalized envelope.
//! All real processing happens asynchronously in the worker pool.

pub mod decode;
pub mod handlers;
pub mod server;

pub use decode::{Decoded, decode_payload};
pub use server::{IngressOptions, IngressState, ServerConfig, app, start_server};
