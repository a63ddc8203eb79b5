// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host editor stand-ins.

use std::sync::Mutex;

use aishell_core::types::{ColumnInfo, ObjectSchema, QueryResult, QueryTextWithCursor, TabInfo};
use aishell_core::{AiShellError, HostBridge, QueryExecutor};
use async_trait::async_trait;
use serde_json::{Value, json};

/// A single-tab editor that records every write.
pub struct MockHostBridge {
    text: Mutex<String>,
    database: Option<String>,
    inserted: Mutex<Vec<String>>,
}

impl MockHostBridge {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
            database: Some("master".to_string()),
            inserted: Mutex::new(Vec::new()),
        }
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    pub fn inserted(&self) -> Vec<String> {
        self.inserted.lock().unwrap().clone()
    }
}

impl Default for MockHostBridge {
    fn default() -> Self {
        Self::new("SELECT 1")
    }
}

#[async_trait]
impl HostBridge for MockHostBridge {
    async fn get_query_text(&self) -> Result<String, AiShellError> {
        Ok(self.text())
    }

    async fn get_query_text_with_cursor(&self) -> Result<QueryTextWithCursor, AiShellError> {
        let text = self.text();
        let cursor = text.chars().count();
        Ok(QueryTextWithCursor { text, cursor })
    }

    async fn insert_text(&self, text: &str) -> Result<(), AiShellError> {
        self.inserted.lock().unwrap().push(text.to_string());
        self.text.lock().unwrap().push_str(text);
        Ok(())
    }

    async fn insert_text_at_cursor(&self, text: &str) -> Result<(), AiShellError> {
        self.insert_text(text).await
    }

    async fn get_execution_plan(&self) -> Result<Value, AiShellError> {
        Ok(json!({ "operators": [] }))
    }

    async fn get_statistics_data(&self) -> Result<Value, AiShellError> {
        Ok(json!({ "logicalReads": 0 }))
    }

    async fn get_messages_data(&self) -> Result<Value, AiShellError> {
        Ok(json!([]))
    }

    async fn get_tab_list(&self) -> Result<Vec<TabInfo>, AiShellError> {
        Ok(vec![TabInfo {
            id: "tab-1".to_string(),
            title: "Query 1".to_string(),
            active: true,
            database: self.database.clone(),
        }])
    }

    async fn switch_to_tab(&self, id: &str) -> Result<(), AiShellError> {
        if id == "tab-1" {
            Ok(())
        } else {
            Err(AiShellError::Bridge {
                message: format!("no tab {id}"),
            })
        }
    }

    async fn get_active_database(&self) -> Result<Option<String>, AiShellError> {
        Ok(self.database.clone())
    }

    async fn set_query_text(&self, text: &str) -> Result<(), AiShellError> {
        *self.text.lock().unwrap() = text.to_string();
        Ok(())
    }
}

/// A server that knows the blocking DMVs and answers every query with
/// one blocked session.
#[derive(Default)]
pub struct MockQueryExecutor {
    executed: Mutex<Vec<String>>,
    schema_fetches: Mutex<Vec<String>>,
}

impl MockQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn schema_fetches(&self) -> Vec<String> {
        self.schema_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for MockQueryExecutor {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, AiShellError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let mut row = serde_json::Map::new();
        row.insert("session_id".into(), json!(53));
        row.insert("blocking_session_id".into(), json!(52));
        row.insert("wait_type".into(), json!("LCK_M_X"));
        Ok(QueryResult {
            fields: vec![
                "session_id".into(),
                "blocking_session_id".into(),
                "wait_type".into(),
            ],
            rows: vec![row],
            row_count: 1,
        })
    }

    async fn fetch_schema(&self, object: &str) -> Result<ObjectSchema, AiShellError> {
        self.schema_fetches.lock().unwrap().push(object.to_string());
        let columns: &[(&str, &str)] = match object.to_ascii_lowercase().as_str() {
            "sys.dm_exec_requests" => &[
                ("session_id", "smallint"),
                ("blocking_session_id", "smallint"),
                ("wait_type", "nvarchar"),
                ("wait_time", "int"),
                ("command", "nvarchar"),
            ],
            "sys.dm_exec_sessions" => &[
                ("session_id", "smallint"),
                ("login_name", "nvarchar"),
                ("status", "nvarchar"),
                ("host_name", "nvarchar"),
            ],
            "sys.dm_tran_locks" => &[
                ("request_session_id", "int"),
                ("resource_type", "nvarchar"),
                ("request_mode", "nvarchar"),
            ],
            _ => &[],
        };
        Ok(ObjectSchema {
            object: object.to_string(),
            columns: columns
                .iter()
                .map(|(name, data_type)| ColumnInfo {
                    name: (*name).to_string(),
                    data_type: (*data_type).to_string(),
                    nullable: false,
                })
                .collect(),
        })
    }
}
