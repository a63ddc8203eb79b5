// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`StorageAdapter`].

use std::path::PathBuf;

use aishell_config::model::StorageConfig;
use aishell_core::{AdapterType, AiShellError, HealthStatus, PluginAdapter, StorageAdapter};
use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::crypto::{self, KEY_LEN, NONCE_LEN};
use crate::database::{Database, map_tr_err};

fn json_err(e: serde_json::Error) -> AiShellError {
    AiShellError::Storage {
        source: Box::new(e),
    }
}

/// Key/value store with a plain table and an AES-256-GCM sealed table.
///
/// Nothing is opened until [`StorageAdapter::initialize`] runs.
pub struct SqliteStore {
    config: StorageConfig,
    key: Option<[u8; KEY_LEN]>,
    state: OnceCell<(Database, [u8; KEY_LEN])>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            key: None,
            state: OnceCell::new(),
        }
    }

    /// Uses `key` instead of the key file at `storage.key_path`.
    pub fn with_key(config: StorageConfig, key: [u8; KEY_LEN]) -> Self {
        Self {
            config,
            key: Some(key),
            state: OnceCell::new(),
        }
    }

    fn state(&self) -> Result<&(Database, [u8; KEY_LEN]), AiShellError> {
        self.state.get().ok_or_else(|| AiShellError::Storage {
            source: "storage not initialized; call initialize() first".into(),
        })
    }

    /// The underlying database, shared with the usage ledger.
    pub fn database(&self) -> Result<&Database, AiShellError> {
        Ok(&self.state()?.0)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, AiShellError> {
        let (db, _) = self.state()?;
        db.connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AiShellError> {
        if let Some((db, _)) = self.state.get() {
            db.checkpoint().await?;
            debug!("storage shutdown checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStore {
    async fn initialize(&self) -> Result<(), AiShellError> {
        let key = match self.key {
            Some(key) => key,
            None => crypto::load_or_create_key(&PathBuf::from(&self.config.key_path))?,
        };
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.state
            .set((db, key))
            .map_err(|_| AiShellError::Storage {
                source: "storage already initialized".into(),
            })?;
        debug!(path = %self.config.database_path, "key/value storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), AiShellError> {
        let (db, _) = self.state()?;
        db.checkpoint().await
    }

    async fn get_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        let (db, _) = self.state()?;
        let key = key.to_string();
        let raw: Option<String> = db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        raw.map(|text| serde_json::from_str(&text).map_err(json_err))
            .transpose()
    }

    async fn set_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        let (db, _) = self.state()?;
        let key = key.to_string();
        let text = serde_json::to_string(&value).map_err(json_err)?;
        db.connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![key, text],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_encrypted_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        let (db, secret) = self.state()?;
        let key = key.to_string();
        let row: Option<(Vec<u8>, Vec<u8>)> = db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT ciphertext, nonce FROM kv_encrypted WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let Some((ciphertext, nonce)) = row else {
            return Ok(None);
        };
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| AiShellError::Storage {
            source: "stored nonce has the wrong length".into(),
        })?;
        let plain = crypto::open(secret, &nonce, &ciphertext)?;
        serde_json::from_slice(&plain).map(Some).map_err(json_err)
    }

    async fn set_encrypted_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        let (db, secret) = self.state()?;
        let plain = serde_json::to_vec(&value).map_err(json_err)?;
        let (ciphertext, nonce) = crypto::seal(secret, &plain)?;
        let key = key.to_string();
        db.connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv_encrypted (key, ciphertext, nonce) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET ciphertext = excluded.ciphertext,
                         nonce = excluded.nonce,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![key, ciphertext, nonce.to_vec()],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> StorageConfig {
        StorageConfig {
            database_path: dir.join("kv.db").to_string_lossy().into_owned(),
            wal_mode: true,
            key_path: dir.join("storage.key").to_string_lossy().into_owned(),
        }
    }

    #[tokio::test]
    async fn requires_initialize() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(config(dir.path()));
        assert!(store.get_data("x").await.is_err());
        assert!(store.health_check().await.is_err());
    }

    #[tokio::test]
    async fn plain_values_upsert() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(config(dir.path()));
        store.initialize().await.unwrap();

        assert_eq!(store.get_data("tabs").await.unwrap(), None);
        store.set_data("tabs", json!([1, 2])).await.unwrap();
        store.set_data("tabs", json!({"active": "t2"})).await.unwrap();
        assert_eq!(store.get_data("tabs").await.unwrap(), Some(json!({"active": "t2"})));
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn encrypted_values_are_not_stored_in_clear() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(config(dir.path()));
        store.initialize().await.unwrap();

        store
            .set_encrypted_data("anthropic_api_key", json!("sk-ant-123"))
            .await
            .unwrap();
        assert_eq!(
            store.get_encrypted_data("anthropic_api_key").await.unwrap(),
            Some(json!("sk-ant-123"))
        );
        // Encrypted and plain namespaces are separate.
        assert_eq!(store.get_data("anthropic_api_key").await.unwrap(), None);

        let raw: Vec<u8> = store
            .database()
            .unwrap()
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT ciphertext FROM kv_encrypted WHERE key = 'anthropic_api_key'",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("sk-ant-123"));
    }

    #[tokio::test]
    async fn encrypted_values_survive_reopen_with_key_file() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteStore::new(config(dir.path()));
            store.initialize().await.unwrap();
            store.set_encrypted_data("k", json!({"a": 1})).await.unwrap();
            store.close().await.unwrap();
        }
        let store = SqliteStore::new(config(dir.path()));
        store.initialize().await.unwrap();
        assert_eq!(store.get_encrypted_data("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn wrong_key_cannot_read() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        {
            let store = SqliteStore::with_key(cfg.clone(), [7u8; KEY_LEN]);
            store.initialize().await.unwrap();
            store.set_encrypted_data("k", json!("v")).await.unwrap();
        }
        let store = SqliteStore::with_key(cfg, [8u8; KEY_LEN]);
        store.initialize().await.unwrap();
        assert!(store.get_encrypted_data("k").await.is_err());
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(config(dir.path()));
        store.initialize().await.unwrap();
        assert!(store.initialize().await.is_err());
        store.shutdown().await.unwrap();
    }
}
