// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store behaviour against a real SQLite file and a counting store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aishell_config::model::{SessionConfig, StorageConfig};
use aishell_core::types::ContentPart;
use aishell_core::{
    AdapterType, AiShellError, ConversationMessage, HealthStatus, MessageContent, PluginAdapter,
    Role, StorageAdapter,
};
use aishell_storage::{ChatSessionStore, SESSIONS_KEY, SessionMetadata, SqliteStore};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

#[derive(Default)]
struct CountingStore {
    data: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
}

#[async_trait]
impl PluginAdapter for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 1)
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
impl StorageAdapter for CountingStore {
    async fn initialize(&self) -> Result<(), AiShellError> {
        Ok(())
    }
    async fn close(&self) -> Result<(), AiShellError> {
        Ok(())
    }
    async fn get_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        Ok(self.data.lock().await.get(key).cloned())
    }
    async fn set_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }
    async fn get_encrypted_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        self.get_data(key).await
    }
    async fn set_encrypted_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        self.set_data(key, value).await
    }
}

fn conversation() -> Vec<ConversationMessage> {
    vec![
        ConversationMessage::system("You are a SQL Server assistant."),
        ConversationMessage::user("show me blocking sessions"),
        ConversationMessage::new(
            Role::Assistant,
            MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Checking sys.dm_exec_requests.".into(),
                },
                ContentPart::ToolInvocation {
                    tool_call_id: "call-1".into(),
                    tool_name: "fetch_object_schema".into(),
                    args: json!({"object": "sys.dm_exec_requests"}),
                    result: Some(json!({"columns": 3})),
                },
            ]),
        ),
        ConversationMessage::assistant("Session 53 is blocking 61."),
    ]
}

fn session_config(debounce_ms: u64) -> SessionConfig {
    SessionConfig {
        persist_debounce_ms: debounce_ms,
        max_sessions: 3,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn created_session_round_trips_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let storage_config = StorageConfig {
        database_path: dir.path().join("s.db").to_string_lossy().into_owned(),
        wal_mode: true,
        key_path: dir.path().join("k").to_string_lossy().into_owned(),
    };
    let sqlite = Arc::new(SqliteStore::new(storage_config.clone()));
    sqlite.initialize().await.unwrap();

    let store = ChatSessionStore::new(sqlite.clone(), &session_config(10_000));
    let messages = conversation();
    let created = store
        .create_session(
            messages.clone(),
            SessionMetadata {
                database: Some("AdventureWorks".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.title, "show me blocking sessions");
    store.flush().await.unwrap();
    sqlite.close().await.unwrap();
    drop(store);
    drop(sqlite);

    let reopened = Arc::new(SqliteStore::new(storage_config));
    reopened.initialize().await.unwrap();
    let store = ChatSessionStore::new(reopened, &session_config(10_000));
    let loaded = store.get_session(&created.id).await.unwrap().unwrap();
    assert_eq!(loaded.messages, messages);
    assert_eq!(loaded.metadata.database.as_deref(), Some("AdventureWorks"));
}

#[tokio::test]
async fn empty_conversations_are_never_persisted() {
    let backing = Arc::new(CountingStore::default());
    let store = ChatSessionStore::new(backing.clone(), &session_config(10));
    let created = store
        .create_session(
            vec![
                ConversationMessage::system("prompt"),
                ConversationMessage::user("  "),
            ],
            SessionMetadata::default(),
        )
        .await
        .unwrap();
    assert!(created.is_none());
    store.flush().await.unwrap();
    assert_eq!(backing.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn routine_updates_are_coalesced() {
    let backing = Arc::new(CountingStore::default());
    let store = ChatSessionStore::new(backing.clone(), &session_config(50));
    let session = store
        .create_session(conversation(), SessionMetadata::default())
        .await
        .unwrap()
        .unwrap();
    for i in 0..5 {
        let mut messages = conversation();
        messages.push(ConversationMessage::assistant(format!("update {i}")));
        assert!(store.update_session(&session.id, messages, None).await.unwrap());
    }
    assert_eq!(backing.writes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backing.writes.load(Ordering::SeqCst), 1);

    let stored = backing.get_data(SESSIONS_KEY).await.unwrap().unwrap();
    let last = &stored[0]["messages"].as_array().unwrap().last().unwrap()["content"];
    assert_eq!(last, "update 4");
}

#[tokio::test]
async fn update_never_empties_a_session() {
    let backing = Arc::new(CountingStore::default());
    let store = ChatSessionStore::new(backing, &session_config(10_000));
    let session = store
        .create_session(conversation(), SessionMetadata::default())
        .await
        .unwrap()
        .unwrap();
    assert!(!store.update_session(&session.id, vec![], None).await.unwrap());
    let kept = store.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(kept.messages.len(), 4);
}

#[tokio::test]
async fn delete_and_clear_write_immediately() {
    let backing = Arc::new(CountingStore::default());
    let store = ChatSessionStore::new(backing.clone(), &session_config(10_000));
    let a = store
        .create_session(conversation(), SessionMetadata::default())
        .await
        .unwrap()
        .unwrap();
    store
        .create_session(conversation(), SessionMetadata::default())
        .await
        .unwrap()
        .unwrap();

    assert!(store.delete_session(&a.id).await.unwrap());
    assert_eq!(backing.writes.load(Ordering::SeqCst), 1);
    assert_eq!(store.list_sessions().await.unwrap().len(), 1);

    store.clear_all().await.unwrap();
    assert_eq!(backing.writes.load(Ordering::SeqCst), 2);
    assert_eq!(
        backing.get_data(SESSIONS_KEY).await.unwrap(),
        Some(json!([]))
    );
}

#[tokio::test]
async fn retention_drops_oldest() {
    let backing = Arc::new(CountingStore::default());
    let store = ChatSessionStore::new(backing, &session_config(10_000));
    let mut ids = Vec::new();
    for _ in 0..5 {
        let s = store
            .create_session(conversation(), SessionMetadata::default())
            .await
            .unwrap()
            .unwrap();
        ids.push(s.id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let listed = store.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].id, ids[4]);
    assert!(store.get_session(&ids[0]).await.unwrap().is_none());
}
