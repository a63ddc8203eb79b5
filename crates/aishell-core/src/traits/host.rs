// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host application bridge (editor tabs, query text, results).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AiShellError;
use crate::types::{QueryTextWithCursor, TabInfo};

/// Request/response access to the host application's editor state.
///
/// Every call is bounded by a timeout; a host that never replies yields
/// [`AiShellError::Timeout`] instead of hanging.
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn get_query_text(&self) -> Result<String, AiShellError>;

    async fn get_query_text_with_cursor(&self) -> Result<QueryTextWithCursor, AiShellError>;

    async fn insert_text(&self, text: &str) -> Result<(), AiShellError>;

    async fn insert_text_at_cursor(&self, text: &str) -> Result<(), AiShellError>;

    async fn get_execution_plan(&self) -> Result<Value, AiShellError>;

    async fn get_statistics_data(&self) -> Result<Value, AiShellError>;

    async fn get_messages_data(&self) -> Result<Value, AiShellError>;

    async fn get_tab_list(&self) -> Result<Vec<TabInfo>, AiShellError>;

    async fn switch_to_tab(&self, id: &str) -> Result<(), AiShellError>;

    async fn get_active_database(&self) -> Result<Option<String>, AiShellError>;

    async fn set_query_text(&self, text: &str) -> Result<(), AiShellError>;
}
