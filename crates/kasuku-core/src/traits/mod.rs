// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for injectable stores and domain handlers.
//!
//! Production backs these with SQLite (kasuku-storage) and registered
//! handler implementations; tests back them with in-memory stubs. There is
//! no package-level mutable state anywhere in the workspace.

pub mod handler;
pub mod store;

pub use handler::DomainHandler;
pub use store::{
    AuditStore, ConversationStore, IdempotencyStore, MessageQueue, NonceStore, RateLimitStore,
};
