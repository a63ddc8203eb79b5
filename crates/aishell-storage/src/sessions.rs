// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat history persisted through a [`StorageAdapter`].
//!
//! Routine updates are coalesced into one write per debounce window.
//! Deletes and clears write immediately. Only those explicit actions may
//! store an empty history; a routine write of an empty list is refused.

use std::sync::Arc;
use std::time::Duration;

use aishell_config::model::SessionConfig;
use aishell_core::{AiShellError, ConversationMessage, Role, SessionId, StorageAdapter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Storage key holding the serialized session list.
pub const SESSIONS_KEY: &str = "chat_sessions";

const TITLE_CHARS: usize = 50;

/// Connection and memory details carried alongside a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_last_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_last_database: Option<String>,
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<ConversationMessage>,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
}

/// Title from the first line of the first user message.
pub fn derive_title(messages: &[ConversationMessage]) -> String {
    let first = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.text())
        .find(|t| !t.trim().is_empty());
    let Some(text) = first else {
        return "New chat".to_string();
    };
    let line = text.trim().lines().next().unwrap_or_default().trim();
    if line.chars().count() <= TITLE_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(TITLE_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

fn has_meaningful(messages: &[ConversationMessage]) -> bool {
    messages.iter().any(ConversationMessage::is_meaningful)
}

#[derive(Default)]
struct StoreState {
    sessions: Option<Vec<ChatSession>>,
    dirty: bool,
    flush_scheduled: bool,
}

struct Inner {
    storage: Arc<dyn StorageAdapter>,
    debounce: Duration,
    max_sessions: usize,
    state: Mutex<StoreState>,
    write_lock: Mutex<()>,
}

/// Session history with debounced persistence.
#[derive(Clone)]
pub struct ChatSessionStore {
    inner: Arc<Inner>,
}

impl ChatSessionStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, config: &SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                debounce: Duration::from_millis(config.persist_debounce_ms),
                max_sessions: config.max_sessions.max(1),
                state: Mutex::new(StoreState::default()),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Stores a new session. Returns `None` when there is nothing worth keeping.
    pub async fn create_session(
        &self,
        messages: Vec<ConversationMessage>,
        metadata: SessionMetadata,
    ) -> Result<Option<ChatSession>, AiShellError> {
        if !has_meaningful(&messages) {
            debug!("skipping session without meaningful messages");
            return Ok(None);
        }
        self.inner.ensure_loaded().await?;

        let session = ChatSession {
            id: SessionId::generate(),
            title: derive_title(&messages),
            timestamp: Utc::now(),
            messages,
            metadata,
        };
        {
            let mut state = self.inner.state.lock().await;
            let sessions = state.sessions.get_or_insert_with(Vec::new);
            sessions.insert(0, session.clone());
            sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            if sessions.len() > self.inner.max_sessions {
                let dropped = sessions.len() - self.inner.max_sessions;
                sessions.truncate(self.inner.max_sessions);
                debug!(dropped, "oldest sessions dropped by retention");
            }
        }
        info!(session_id = %session.id, title = %session.title, "session created");
        self.inner.schedule_flush().await;
        Ok(Some(session))
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Option<ChatSession>, AiShellError> {
        self.inner.ensure_loaded().await?;
        let state = self.inner.state.lock().await;
        Ok(state
            .sessions
            .as_ref()
            .and_then(|all| all.iter().find(|s| &s.id == id).cloned()))
    }

    /// Replaces a session's messages after an assistant turn.
    ///
    /// Returns `false` if the session is unknown or the new history has no
    /// meaningful message; a populated history is never replaced by an
    /// empty one here.
    pub async fn update_session(
        &self,
        id: &SessionId,
        messages: Vec<ConversationMessage>,
        metadata: Option<SessionMetadata>,
    ) -> Result<bool, AiShellError> {
        if !has_meaningful(&messages) {
            warn!(session_id = %id, "refusing to overwrite session with empty history");
            return Ok(false);
        }
        self.inner.ensure_loaded().await?;
        {
            let mut state = self.inner.state.lock().await;
            let Some(session) = state
                .sessions
                .as_mut()
                .and_then(|all| all.iter_mut().find(|s| &s.id == id))
            else {
                return Ok(false);
            };
            if session.title == "New chat" {
                session.title = derive_title(&messages);
            }
            session.messages = messages;
            session.timestamp = Utc::now();
            if let Some(metadata) = metadata {
                session.metadata = metadata;
            }
            if let Some(all) = state.sessions.as_mut() {
                all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            }
        }
        self.inner.schedule_flush().await;
        Ok(true)
    }

    /// All sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<ChatSession>, AiShellError> {
        self.inner.ensure_loaded().await?;
        let state = self.inner.state.lock().await;
        Ok(state.sessions.clone().unwrap_or_default())
    }

    /// Removes a session and writes immediately.
    pub async fn delete_session(&self, id: &SessionId) -> Result<bool, AiShellError> {
        self.inner.ensure_loaded().await?;
        let removed = {
            let mut state = self.inner.state.lock().await;
            let sessions = state.sessions.get_or_insert_with(Vec::new);
            let before = sessions.len();
            sessions.retain(|s| &s.id != id);
            let removed = sessions.len() != before;
            if removed {
                state.dirty = true;
            }
            removed
        };
        if removed {
            info!(session_id = %id, "session deleted");
            self.inner.write(true).await?;
        }
        Ok(removed)
    }

    /// Deletes every session and writes the empty list immediately.
    pub async fn clear_all(&self) -> Result<(), AiShellError> {
        {
            let mut state = self.inner.state.lock().await;
            state.sessions = Some(Vec::new());
            state.dirty = true;
        }
        info!("all sessions cleared");
        self.inner.write(true).await
    }

    /// Writes pending changes now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<(), AiShellError> {
        self.inner.write(false).await
    }
}

impl Inner {
    async fn ensure_loaded(&self) -> Result<(), AiShellError> {
        if self.state.lock().await.sessions.is_some() {
            return Ok(());
        }
        let loaded: Vec<ChatSession> = match self.storage.get_data(SESSIONS_KEY).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| AiShellError::Storage {
                source: Box::new(e),
            })?,
            None => Vec::new(),
        };
        let mut state = self.state.lock().await;
        if state.sessions.is_none() {
            debug!(count = loaded.len(), "sessions loaded");
            state.sessions = Some(loaded);
        }
        Ok(())
    }

    async fn schedule_flush(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.dirty = true;
        if state.flush_scheduled {
            return;
        }
        state.flush_scheduled = true;
        drop(state);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.state.lock().await.flush_scheduled = false;
            if let Err(e) = inner.write(false).await {
                warn!(error = %e, "debounced session write failed");
            }
        });
    }

    async fn write(&self, explicit: bool) -> Result<(), AiShellError> {
        let _serialized = self.write_lock.lock().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.dirty {
                return Ok(());
            }
            let snapshot = state.sessions.clone().unwrap_or_default();
            if snapshot.is_empty() && !explicit {
                warn!("blocked routine write of an empty session list");
                state.dirty = false;
                return Ok(());
            }
            state.dirty = false;
            snapshot
        };
        let value = serde_json::to_value(&snapshot).map_err(|e| AiShellError::Storage {
            source: Box::new(e),
        })?;
        if let Err(e) = self.storage.set_data(SESSIONS_KEY, value).await {
            self.state.lock().await.dirty = true;
            return Err(e);
        }
        debug!(count = snapshot.len(), explicit, "sessions persisted");
        Ok(())
    }
}
