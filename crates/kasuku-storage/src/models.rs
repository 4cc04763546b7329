// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `kasuku-core::types` for use across
//! trait boundaries. This module re-exports them for convenience within the
//! storage crate.

pub use kasuku_core::types::{AuditEntry, AuditEventType, ConversationState, QueueEntry};
