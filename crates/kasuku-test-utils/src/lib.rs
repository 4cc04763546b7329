// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Kasuku workspace.
//!
//! Provides a full-pipeline [`TestHarness`] over a temp SQLite database and
//! a scriptable [`MockFlowHandler`] with failure injection and a
//! concurrency probe.

pub mod harness;
pub mod mock_handler;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_handler::MockFlowHandler;
