// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use aishell_core::{
    AdapterType, AiShellError, HealthStatus, PluginAdapter, StorageAdapter,
};
use async_trait::async_trait;
use serde_json::Value;

/// Key/value store backed by a `HashMap`. The sealed namespace is kept
/// apart from the plain one but not encrypted.
#[derive(Default)]
pub struct MemoryStore {
    plain: Mutex<HashMap<String, Value>>,
    sealed: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under `key` in the plain namespace.
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.plain.lock().unwrap().get(key).cloned()
    }

    /// Keys written so far, in order, including repeats.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, AiShellError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AiShellError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    async fn initialize(&self) -> Result<(), AiShellError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AiShellError> {
        Ok(())
    }

    async fn get_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        Ok(self.raw(key))
    }

    async fn set_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        self.writes.lock().unwrap().push(key.to_string());
        self.plain.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_encrypted_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        Ok(self.sealed.lock().unwrap().get(key).cloned())
    }

    async fn set_encrypted_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        self.sealed.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}
