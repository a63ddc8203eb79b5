// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value persistence collaborator.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AiShellError;
use crate::traits::adapter::PluginAdapter;

/// Opaque JSON key/value storage for configuration and chat history.
///
/// Callers never assume synchronous availability; every access is async.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connections).
    async fn initialize(&self) -> Result<(), AiShellError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), AiShellError>;

    async fn get_data(&self, key: &str) -> Result<Option<Value>, AiShellError>;

    async fn set_data(&self, key: &str, value: Value) -> Result<(), AiShellError>;

    /// Reads a value stored with [`StorageAdapter::set_encrypted_data`].
    async fn get_encrypted_data(&self, key: &str) -> Result<Option<Value>, AiShellError>;

    async fn set_encrypted_data(&self, key: &str, value: Value) -> Result<(), AiShellError>;
}
