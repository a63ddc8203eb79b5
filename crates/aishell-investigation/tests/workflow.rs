// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end investigation flows through the tool gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aishell_config::model::{InvestigationConfig, ToolsConfig};
use aishell_core::types::{ColumnInfo, ObjectSchema, QueryResult};
use aishell_core::{
    AdapterType, AiShellError, HealthStatus, PluginAdapter, QueryExecutor, StorageAdapter,
};
use aishell_investigation::{
    CONTEXT_STACK_KEY, ContextStack, InvestigationPhase, InvestigationToolkit, InvestigationTracker, SchemaFirstGuard,
    parse_bare_number, register_investigation_tools,
};
use aishell_tools::{PermissionBroker, ToolCall, ToolGateway, ToolRegistry, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};

#[derive(Default)]
struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
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
impl StorageAdapter for MemoryStore {
    async fn initialize(&self) -> Result<(), AiShellError> {
        Ok(())
    }
    async fn close(&self) -> Result<(), AiShellError> {
        Ok(())
    }
    async fn get_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }
    async fn set_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        self.data.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
    async fn get_encrypted_data(&self, key: &str) -> Result<Option<Value>, AiShellError> {
        self.get_data(key).await
    }
    async fn set_encrypted_data(&self, key: &str, value: Value) -> Result<(), AiShellError> {
        self.set_data(key, value).await
    }
}

/// Answers every query with one row and knows a few DMV schemas.
#[derive(Default)]
struct FakeServer {
    executed: Mutex<Vec<String>>,
    schema_fetches: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for FakeServer {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, AiShellError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let mut row = serde_json::Map::new();
        row.insert("session_id".into(), json!(52));
        Ok(QueryResult {
            fields: vec!["session_id".into()],
            rows: vec![row],
            row_count: 1,
        })
    }

    async fn fetch_schema(&self, object: &str) -> Result<ObjectSchema, AiShellError> {
        self.schema_fetches.fetch_add(1, Ordering::SeqCst);
        let columns = match object {
            "sys.dm_exec_requests" => vec!["session_id", "blocking_session_id", "wait_type", "wait_time"],
            "sys.dm_exec_sessions" => vec!["session_id", "login_name", "status"],
            _ => vec![],
        };
        Ok(ObjectSchema {
            object: object.to_string(),
            columns: columns
                .into_iter()
                .map(|name| ColumnInfo {
                    name: name.into(),
                    data_type: "int".into(),
                    nullable: false,
                })
                .collect(),
        })
    }
}

struct Fixture {
    gateway: ToolGateway,
    tracker: Arc<InvestigationTracker>,
    server: Arc<FakeServer>,
    contexts: ContextStack,
    store: Arc<MemoryStore>,
    calls: AtomicUsize,
}

impl Fixture {
    fn new(minimum: u32) -> Self {
        let config = InvestigationConfig {
            minimum_required_queries: minimum,
            context_stack_limit: 3,
            ..InvestigationConfig::default()
        };
        let tools_config = ToolsConfig {
            allow_execution_of_read_only_queries: true,
            ..ToolsConfig::default()
        };
        let tracker = Arc::new(InvestigationTracker::new(&config));
        let server = Arc::new(FakeServer::default());
        let store = Arc::new(MemoryStore::default());
        let contexts = ContextStack::new(store.clone(), config.context_stack_limit);
        let toolkit = Arc::new(InvestigationToolkit {
            tracker: tracker.clone(),
            executor: server.clone(),
            contexts: contexts.clone(),
            tools_config: tools_config.clone(),
        });
        let mut registry = ToolRegistry::new();
        register_investigation_tools(&mut registry, toolkit);
        let gateway = ToolGateway::new(
            Arc::new(registry),
            Arc::new(PermissionBroker::default()),
            &tools_config,
        )
        .with_guard(Arc::new(SchemaFirstGuard::new(tracker.clone())));
        Self {
            gateway,
            tracker,
            server,
            contexts,
            store,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of investigation contexts persisted in storage.
    async fn saved_contexts(&self) -> usize {
        self.store
            .get_data(CONTEXT_STACK_KEY)
            .await
            .unwrap()
            .and_then(|v| v.as_array().map(Vec::len))
            .unwrap_or(0)
    }

    async fn call(&self, name: &str, args: Value) -> ToolResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.gateway
            .execute(&ToolCall::new(format!("call-{n}"), name, args))
            .await
    }

    async fn run(&self, sql: &str) -> ToolResult {
        self.call("run_diagnostic_query", json!({ "sql": sql })).await
    }
}

const BLOCKING: &str = "SELECT session_id, blocking_session_id, wait_type \
                        FROM sys.dm_exec_requests WHERE blocking_session_id <> 0";

#[tokio::test]
async fn blocking_question_fetches_schema_before_querying() {
    let fx = Fixture::new(3);
    let started = fx
        .call("start_investigation", json!({"question": "show me blocking sessions"}))
        .await;
    assert!(started.is_success());
    assert_eq!(fx.tracker.phase(), InvestigationPhase::QuestionAnalyzed);

    let blocked = fx.run(BLOCKING).await;
    let ToolResult::ValidationFailure { invalid, next_step, .. } = blocked else {
        panic!("expected schema-first refusal, got {blocked:?}");
    };
    assert_eq!(invalid, vec!["sys.dm_exec_requests"]);
    assert!(next_step.contains("fetch_object_schema"));
    assert!(fx.server.executed.lock().unwrap().is_empty());

    let fetched = fx
        .call("fetch_object_schema", json!({"object": "sys.dm_exec_requests"}))
        .await;
    assert!(fetched.is_success());
    assert_eq!(fx.tracker.phase(), InvestigationPhase::SchemaFetched);

    assert!(fx.run(BLOCKING).await.is_success());
    assert_eq!(fx.tracker.phase(), InvestigationPhase::QueryExecuted(1));
    assert_eq!(fx.server.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn every_unfetched_catalog_object_is_reported() {
    let fx = Fixture::new(3);
    fx.call("start_investigation", json!({"question": "who is waiting"}))
        .await;
    fx.call("fetch_object_schema", json!({"object": "sys.dm_exec_requests"}))
        .await;

    let sql = "SELECT r.session_id FROM sys.dm_exec_requests r \
               JOIN sys.dm_exec_sessions s ON s.session_id = r.session_id \
               JOIN sys.dm_os_waiting_tasks w ON w.session_id = r.session_id";
    let ToolResult::ValidationFailure { invalid, .. } = fx.run(sql).await else {
        panic!("expected refusal");
    };
    assert_eq!(invalid, vec!["sys.dm_exec_sessions", "sys.dm_os_waiting_tasks"]);
    assert_eq!(fx.tracker.queries_executed(), 0);
}

#[tokio::test]
async fn recommendations_wait_for_enough_queries() {
    let fx = Fixture::new(3);
    fx.call("start_investigation", json!({"question": "slow inserts"}))
        .await;
    fx.call("fetch_object_schema", json!({"object": "sys.dm_exec_requests"}))
        .await;
    let recs = json!({
        "recommendations": ["Kill the head blocker"],
        "next_steps": ["Show the head blocker's query"]
    });

    for _ in 0..2 {
        assert!(fx.run(BLOCKING).await.is_success());
    }
    let early = fx
        .call("provide_investigation_recommendations", recs.clone())
        .await;
    assert!(matches!(early, ToolResult::ValidationFailure { .. }));
    assert!(fx.contexts.latest().await.unwrap().is_none());

    assert!(fx.run(BLOCKING).await.is_success());
    let done = fx
        .call("provide_investigation_recommendations", recs)
        .await;
    assert!(done.is_success(), "{done:?}");
    assert_eq!(fx.tracker.phase(), InvestigationPhase::AwaitingSelection);
    assert_eq!(fx.saved_contexts().await, 1);
}

#[tokio::test]
async fn bare_number_reply_picks_the_matching_next_step() {
    let fx = Fixture::new(3);
    fx.call("start_investigation", json!({"question": "tempdb growth"}))
        .await;
    for _ in 0..3 {
        fx.run("SELECT TOP 5 name FROM dbo.files").await;
    }
    fx.call(
        "provide_investigation_recommendations",
        json!({
            "recommendations": ["Add tempdb files", "Cap the version store"],
            "next_steps": ["List open transactions", "Show version store usage"]
        }),
    )
    .await;

    let number = parse_bare_number("2").expect("bare number");
    let resolved = fx
        .call("retrieve_investigation_context", json!({"number": number}))
        .await;
    let ToolResult::Success { data } = resolved else {
        panic!("expected a resolved option");
    };
    assert_eq!(data["outcome"], "found");
    assert_eq!(data["kind"], "next_step");
    assert_eq!(data["option"]["number"], 2);
    assert_eq!(data["option"]["text"], "Show version store usage");

    let missing = fx
        .call("retrieve_investigation_context", json!({"number": 7}))
        .await;
    let ToolResult::ValidationFailure { invalid, next_step, .. } = missing else {
        panic!("out of range numbers are never guessed");
    };
    assert_eq!(invalid, vec!["7"]);
    assert!(next_step.contains("1, 2"));
}

#[tokio::test]
async fn query_builder_checks_columns_against_fetched_schema() {
    let fx = Fixture::new(3);
    fx.call("start_investigation", json!({"question": "waits"}))
        .await;

    let unfetched = fx
        .call(
            "generate_diagnostic_query",
            json!({"object": "sys.dm_exec_requests", "columns": ["wait_type"]}),
        )
        .await;
    assert!(matches!(unfetched, ToolResult::ValidationFailure { .. }));

    fx.call("fetch_object_schema", json!({"object": "[sys].[dm_exec_requests]"}))
        .await;
    let bad = fx
        .call(
            "generate_diagnostic_query",
            json!({
                "object": "sys.dm_exec_requests",
                "columns": ["wait_type", "cpu_percent"],
                "order_by": "elapsed DESC"
            }),
        )
        .await;
    let ToolResult::ValidationFailure { invalid, next_step, .. } = bad else {
        panic!("expected invalid columns");
    };
    assert_eq!(invalid, vec!["cpu_percent", "elapsed"]);
    assert!(next_step.contains("blocking_session_id"));

    let good = fx
        .call(
            "generate_diagnostic_query",
            json!({
                "object": "sys.dm_exec_requests",
                "columns": ["session_id", "wait_time"],
                "filter": "wait_time > 1000",
                "order_by": "wait_time DESC",
                "top": 10
            }),
        )
        .await;
    let ToolResult::Success { data } = good else {
        panic!("expected a query");
    };
    assert_eq!(
        data["sql"],
        "SELECT TOP (10) [session_id], [wait_time] FROM sys.dm_exec_requests \
         WHERE wait_time > 1000 ORDER BY wait_time DESC"
    );
    assert_eq!(fx.tracker.phase(), InvestigationPhase::QueryGenerated);
    assert_eq!(fx.server.schema_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn context_stack_keeps_only_the_newest() {
    let fx = Fixture::new(3);
    for round in 0..5 {
        fx.tracker.begin_turn();
        fx.call("start_investigation", json!({"question": format!("q{round}")}))
            .await;
        for _ in 0..3 {
            fx.run("SELECT 1").await;
        }
        fx.call(
            "provide_investigation_recommendations",
            json!({"recommendations": [format!("r{round}")]}),
        )
        .await;
    }
    assert_eq!(fx.saved_contexts().await, 3);
    let latest = fx.contexts.latest().await.unwrap().unwrap();
    assert_eq!(latest.question.as_deref(), Some("q4"));
    assert_eq!(latest.recommendations[0].text, "r4");
}
