// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation routing for the Kasuku webhook platform.
//!
//! Selects the domain handler for each envelope -- active flow first, then
//! message keywords, then the home fallback -- invokes it under a timeout,
//! and persists the handler's returned state.

pub mod home;
pub mod keywords;
pub mod router;

pub use home::HomeMenuHandler;
pub use router::{ConversationRouter, FlowSelection, HandlerRegistry, SelectionReason, select_flow};
