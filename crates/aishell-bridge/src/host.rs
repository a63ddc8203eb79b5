// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`HostBridge`] over a [`RequestTransport`].

use async_trait::async_trait;
use aishell_config::model::BridgeConfig;
use aishell_core::types::{ObjectSchema, QueryResult, QueryTextWithCursor, TabInfo};
use aishell_core::{AiShellError, HostBridge, QueryExecutor};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::transport::{BridgeRequest, RequestTransport};

/// Request names understood by the host.
pub mod names {
    pub const GET_QUERY_TEXT: &str = "getQueryText";
    pub const GET_QUERY_TEXT_WITH_CURSOR: &str = "getQueryTextWithCursor";
    pub const INSERT_TEXT: &str = "insertText";
    pub const INSERT_TEXT_AT_CURSOR: &str = "insertTextAtCursor";
    pub const GET_EXECUTION_PLAN: &str = "getExecutionPlan";
    pub const GET_STATISTICS_DATA: &str = "getStatisticsData";
    pub const GET_MESSAGES_DATA: &str = "getMessagesData";
    pub const GET_TAB_LIST: &str = "getTabList";
    pub const SWITCH_TO_TAB: &str = "switchToTab";
    pub const GET_ACTIVE_DATABASE: &str = "getActiveDatabase";
    pub const SET_QUERY_TEXT: &str = "setQueryText";
    pub const RUN_QUERY: &str = "runQuery";
    pub const FETCH_OBJECT_SCHEMA: &str = "fetchObjectSchema";
}

/// Host application reached through correlated bridge requests. The host
/// owns the database connection, so queries go through it as well.
#[derive(Clone)]
pub struct BridgeHost {
    transport: RequestTransport,
}

impl BridgeHost {
    pub fn new(transport: RequestTransport) -> Self {
        Self { transport }
    }

    /// Builds a host and its request receiver from configuration.
    pub fn from_config(config: &BridgeConfig) -> (Self, mpsc::UnboundedReceiver<BridgeRequest>) {
        let (transport, rx) =
            RequestTransport::new(Duration::from_millis(config.request_timeout_ms));
        (Self::new(transport), rx)
    }

    pub fn transport(&self) -> &RequestTransport {
        &self.transport
    }

    async fn unit(&self, name: &str, args: Value) -> Result<(), AiShellError> {
        // Hosts answer mutations with null or an acknowledgement object.
        let _: Value = self.transport.request(name, &args).await?;
        Ok(())
    }
}

#[async_trait]
impl HostBridge for BridgeHost {
    async fn get_query_text(&self) -> Result<String, AiShellError> {
        self.transport.request(names::GET_QUERY_TEXT, &json!({})).await
    }

    async fn get_query_text_with_cursor(&self) -> Result<QueryTextWithCursor, AiShellError> {
        self.transport
            .request(names::GET_QUERY_TEXT_WITH_CURSOR, &json!({}))
            .await
    }

    async fn insert_text(&self, text: &str) -> Result<(), AiShellError> {
        self.unit(names::INSERT_TEXT, json!({ "text": text })).await
    }

    async fn insert_text_at_cursor(&self, text: &str) -> Result<(), AiShellError> {
        self.unit(names::INSERT_TEXT_AT_CURSOR, json!({ "text": text }))
            .await
    }

    async fn get_execution_plan(&self) -> Result<Value, AiShellError> {
        self.transport
            .request(names::GET_EXECUTION_PLAN, &json!({}))
            .await
    }

    async fn get_statistics_data(&self) -> Result<Value, AiShellError> {
        self.transport
            .request(names::GET_STATISTICS_DATA, &json!({}))
            .await
    }

    async fn get_messages_data(&self) -> Result<Value, AiShellError> {
        self.transport
            .request(names::GET_MESSAGES_DATA, &json!({}))
            .await
    }

    async fn get_tab_list(&self) -> Result<Vec<TabInfo>, AiShellError> {
        self.transport.request(names::GET_TAB_LIST, &json!({})).await
    }

    async fn switch_to_tab(&self, id: &str) -> Result<(), AiShellError> {
        self.unit(names::SWITCH_TO_TAB, json!({ "tabId": id })).await
    }

    async fn get_active_database(&self) -> Result<Option<String>, AiShellError> {
        self.transport
            .request(names::GET_ACTIVE_DATABASE, &json!({}))
            .await
    }

    async fn set_query_text(&self, text: &str) -> Result<(), AiShellError> {
        self.unit(names::SET_QUERY_TEXT, json!({ "text": text })).await
    }
}

#[async_trait]
impl QueryExecutor for BridgeHost {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, AiShellError> {
        self.transport
            .request(names::RUN_QUERY, &json!({ "sql": sql }))
            .await
    }

    async fn fetch_schema(&self, object: &str) -> Result<ObjectSchema, AiShellError> {
        self.transport
            .request(names::FETCH_OBJECT_SCHEMA, &json!({ "object": object }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::transport::BridgeResponse;

    type Seen = Arc<Mutex<Vec<BridgeRequest>>>;

    fn spawn_host(host: BridgeHost, mut rx: mpsc::UnboundedReceiver<BridgeRequest>) -> Seen {
        let seen: Seen = Arc::default();
        let log = seen.clone();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let result = match req.name.as_str() {
                    names::GET_QUERY_TEXT => json!("SELECT 1"),
                    names::GET_QUERY_TEXT_WITH_CURSOR => json!({"text": "SELECT 1", "cursor": 7}),
                    names::GET_TAB_LIST => json!([
                        {"id": "t1", "title": "Query 1", "active": true, "database": "master"}
                    ]),
                    names::GET_ACTIVE_DATABASE => json!("master"),
                    names::RUN_QUERY => json!({
                        "fields": ["name"],
                        "rows": [{"name": "master"}],
                        "rowCount": 1
                    }),
                    names::FETCH_OBJECT_SCHEMA => json!({
                        "object": req.args["object"],
                        "columns": [{"name": "session_id", "dataType": "smallint"}]
                    }),
                    _ => Value::Null,
                };
                log.lock().unwrap().push(req.clone());
                host.transport().deliver(BridgeResponse::ok(req.id, result));
            }
        });
        seen
    }

    #[tokio::test]
    async fn typed_host_calls() {
        let (host, rx) = BridgeHost::from_config(&BridgeConfig::default());
        let seen = spawn_host(host.clone(), rx);

        assert_eq!(host.get_query_text().await.unwrap(), "SELECT 1");
        assert_eq!(host.get_query_text_with_cursor().await.unwrap().cursor, 7);
        let tabs = host.get_tab_list().await.unwrap();
        assert_eq!(tabs[0].database.as_deref(), Some("master"));
        assert_eq!(host.get_active_database().await.unwrap().as_deref(), Some("master"));
        host.switch_to_tab("t1").await.unwrap();
        host.set_query_text("SELECT 2").await.unwrap();

        let seen = seen.lock().unwrap();
        let switch = seen.iter().find(|r| r.name == names::SWITCH_TO_TAB).unwrap();
        assert_eq!(switch.args["tabId"], "t1");
        let set = seen.iter().find(|r| r.name == names::SET_QUERY_TEXT).unwrap();
        assert_eq!(set.args["text"], "SELECT 2");
    }

    #[tokio::test]
    async fn queries_go_through_the_host() {
        let (host, rx) = BridgeHost::from_config(&BridgeConfig::default());
        let seen = spawn_host(host.clone(), rx);

        let result = host.run_query("SELECT name FROM sys.databases").await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["name"], "master");

        let schema = host.fetch_schema("sys.dm_exec_requests").await.unwrap();
        assert_eq!(schema.object, "sys.dm_exec_requests");
        assert!(schema.has_column("SESSION_ID"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].args["sql"], "SELECT name FROM sys.databases");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_host_times_out() {
        let (host, _rx) = BridgeHost::from_config(&BridgeConfig {
            request_timeout_ms: 500,
        });
        let err = host.get_execution_plan().await.unwrap_err();
        assert!(matches!(err, AiShellError::Timeout { duration } if duration == Duration::from_millis(500)));
    }
}
