// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! Provider and storage adapters extend the [`PluginAdapter`] base trait.
//! All async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod credits;
pub mod host;
pub mod notify;
pub mod provider;
pub mod query;
pub mod storage;

pub use adapter::PluginAdapter;
pub use credits::CreditsAdapter;
pub use host::HostBridge;
pub use notify::{Notifier, UsageLogger};
pub use provider::{ProviderAdapter, ProviderStream};
pub use query::QueryExecutor;
pub use storage::StorageAdapter;
