// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for AI Shell integration tests.
//!
//! Provides mock collaborators and a harness for fast, deterministic tests
//! without a model provider, a host editor or a database server.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted provider with request capture
//! - [`MockHostBridge`] and [`MockQueryExecutor`] - host and server stand-ins
//! - [`MemoryStore`] - in-memory storage adapter
//! - [`TestHarness`] - a wired orchestrator over all of the above

pub mod harness;
pub mod memory_store;
pub mod mock_host;
pub mod mock_provider;
pub mod recorders;

pub use harness::{PROVIDER_IDS, TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryStore;
pub use mock_host::{MockHostBridge, MockQueryExecutor};
pub use mock_provider::{MOCK_USAGE, MockProvider, Scripted};
pub use recorders::{RecordingUsageLogger, StaticCredits};
