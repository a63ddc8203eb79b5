// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Investigation workflow exposed as model tools.

use std::sync::Arc;

use aishell_config::model::ToolsConfig;
use aishell_core::{AiShellError, QueryExecutor};
use aishell_tools::{
    CallGuard, Tool, ToolAccess, ToolRegistry, ToolResult, parse_args, redact_query_result,
    syntax_problems,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::context::{ContextStack, Resolution};
use crate::objects::normalize_object_name;
use crate::tracker::{InvestigationError, InvestigationTracker};

const DEFAULT_TOP: u32 = 50;
const MAX_TOP: u32 = 1_000;

/// Everything the investigation tools of one conversation share.
pub struct InvestigationToolkit {
    pub tracker: Arc<InvestigationTracker>,
    pub executor: Arc<dyn QueryExecutor>,
    pub contexts: ContextStack,
    pub tools_config: ToolsConfig,
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, AiShellError> {
    serde_json::to_value(value).map_err(|e| AiShellError::Internal(e.to_string()))
}

fn schema_required(objects: Vec<String>) -> ToolResult {
    ToolResult::validation(
        "Diagnostic queries may only reference catalog objects whose schema has been fetched.",
        objects,
        "Call fetch_object_schema for each listed object, then retry with columns that exist.",
    )
}

/// Converts a refused workflow step into something the model can act on.
fn refusal(err: InvestigationError) -> ToolResult {
    match err {
        InvestigationError::SchemaRequired { objects } => schema_required(objects),
        InvestigationError::InsufficientEvidence { executed, required } => ToolResult::validation(
            format!(
                "Only {executed} of the {required} required diagnostic queries have run; recommendations are not allowed yet."
            ),
            vec![format!("queries_executed={executed}")],
            format!(
                "Run {} more diagnostic queries with run_diagnostic_query, then record findings.",
                required - executed
            ),
        ),
        InvestigationError::QueryInFlight => ToolResult::error(
            "Another diagnostic query is still running. Wait for its result before starting the next one.",
        ),
        InvestigationError::NotStarted => ToolResult::validation(
            "No investigation is in progress.",
            Vec::new(),
            "Call start_investigation with the user's question first.",
        ),
    }
}

/// Blocks SQL that touches catalog objects with unfetched schemas, for any
/// tool that carries SQL, before the user is asked to approve it.
pub struct SchemaFirstGuard {
    tracker: Arc<InvestigationTracker>,
}

impl SchemaFirstGuard {
    pub fn new(tracker: Arc<InvestigationTracker>) -> Self {
        Self { tracker }
    }
}

impl CallGuard for SchemaFirstGuard {
    fn check(&self, tool: &dyn Tool, args: &Value) -> Option<ToolResult> {
        let sql = tool.sql_argument(args)?;
        match self.tracker.check_schema_first(&sql) {
            Ok(()) => None,
            Err(e) => {
                info!(tool = tool.name(), error = %e, "query blocked until schema is fetched");
                Some(refusal(e))
            }
        }
    }
}

// --- start_investigation ---

struct StartInvestigation(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct StartArgs {
    question: String,
}

#[async_trait]
impl Tool for StartInvestigation {
    fn name(&self) -> &str {
        "start_investigation"
    }

    fn description(&self) -> &str {
        "Begins a diagnostic investigation of a SQL Server problem. Call once per new question before fetching schemas or running diagnostic queries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "The problem being investigated, in the user's words" }
            },
            "required": ["question"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let StartArgs { question } = parse_args(self.name(), args)?;
        let tracker = &self.0.tracker;
        tracker.analyze_question(&question);
        Ok(ToolResult::success(json!({
            "phase": tracker.phase(),
            "minimumRequiredQueries": tracker.minimum_required(),
            "instructions": format!(
                "Fetch the schema of every catalog object ({} schemas) before querying it, run at least {} diagnostic queries one at a time, record findings, then provide numbered recommendations.",
                tracker.system_schemas().join("/"),
                tracker.minimum_required()
            ),
        })))
    }
}

// --- fetch_object_schema ---

struct FetchObjectSchema(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct FetchArgs {
    object: String,
}

#[async_trait]
impl Tool for FetchObjectSchema {
    fn name(&self) -> &str {
        "fetch_object_schema"
    }

    fn description(&self) -> &str {
        "Lists the columns of a table, view or system catalog object such as sys.dm_exec_requests. Required before querying catalog objects."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "object": { "type": "string", "description": "Schema-qualified object name" }
            },
            "required": ["object"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let FetchArgs { object } = parse_args(self.name(), args)?;
        let name = normalize_object_name(&object);
        let mut schema = self.0.executor.fetch_schema(&name).await?;
        if schema.columns.is_empty() {
            return Ok(ToolResult::validation(
                format!("No columns found for {name}."),
                vec![name],
                "Check the object name; catalog views live in the sys or INFORMATION_SCHEMA schemas.",
            ));
        }
        schema.object = name.clone();
        let columns = to_value(&schema.columns)?;
        self.0.tracker.record_schema(schema);
        Ok(ToolResult::success(json!({
            "object": name,
            "columns": columns,
        })))
    }
}

// --- generate_diagnostic_query ---

struct GenerateDiagnosticQuery(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct GenerateArgs {
    object: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    top: Option<u32>,
}

/// `name DESC` -> `name`.
fn order_column(order_by: &str) -> &str {
    order_by.split_whitespace().next().unwrap_or_default()
}

fn quote_column(name: &str) -> String {
    format!("[{}]", name.trim_matches(|c| c == '[' || c == ']'))
}

#[async_trait]
impl Tool for GenerateDiagnosticQuery {
    fn name(&self) -> &str {
        "generate_diagnostic_query"
    }

    fn description(&self) -> &str {
        "Builds a SELECT against an object whose schema was fetched, rejecting columns that do not exist. Does not execute it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "object": { "type": "string" },
                "columns": { "type": "array", "items": { "type": "string" }, "description": "Columns to select; empty selects all" },
                "filter": { "type": "string", "description": "Optional WHERE clause body" },
                "order_by": { "type": "string", "description": "Column, optionally followed by ASC or DESC" },
                "top": { "type": "integer", "minimum": 1 }
            },
            "required": ["object"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::Validation
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let args: GenerateArgs = parse_args(self.name(), args)?;
        let object = normalize_object_name(&args.object);
        let Some(schema) = self.0.tracker.schema_for(&object) else {
            return Ok(schema_required(vec![object]));
        };

        let mut invalid: Vec<String> = args
            .columns
            .iter()
            .filter(|c| !schema.has_column(c.trim_matches(|ch| ch == '[' || ch == ']')))
            .cloned()
            .collect();
        if let Some(order_by) = &args.order_by {
            let column = order_column(order_by);
            if !schema.has_column(column.trim_matches(|ch| ch == '[' || ch == ']')) {
                invalid.push(column.to_string());
            }
        }
        if !invalid.is_empty() {
            let available: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
            return Ok(ToolResult::validation(
                format!("{object} has no column named {}.", invalid.join(", ")),
                invalid,
                format!("Use only these columns: {}.", available.join(", ")),
            ));
        }

        let top = args.top.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP);
        let select = if args.columns.is_empty() {
            "*".to_string()
        } else {
            args.columns
                .iter()
                .map(|c| quote_column(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT TOP ({top}) {select} FROM {object}");
        if let Some(filter) = args.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            sql.push_str(&format!(" WHERE {filter}"));
        }
        if let Some(order_by) = &args.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_by.trim()));
        }

        let problems = syntax_problems(&sql);
        if !problems.is_empty() {
            return Ok(ToolResult::validation(
                "The generated query is malformed; the filter is the likely cause.",
                problems,
                "Simplify the filter and generate the query again.",
            ));
        }
        self.0.tracker.note_query_generated();
        Ok(ToolResult::success(json!({ "sql": sql })))
    }
}

// --- run_diagnostic_query ---

struct RunDiagnosticQuery(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct RunArgs {
    sql: String,
    #[serde(default)]
    purpose: Option<String>,
}

#[async_trait]
impl Tool for RunDiagnosticQuery {
    fn name(&self) -> &str {
        "run_diagnostic_query"
    }

    fn description(&self) -> &str {
        "Executes one diagnostic query as evidence for the current investigation. Only one may run at a time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" },
                "purpose": { "type": "string", "description": "What this query is meant to show" }
            },
            "required": ["sql"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::QueryExecution
    }

    fn sql_argument(&self, args: &Value) -> Option<String> {
        args.get("sql").and_then(Value::as_str).map(str::to_string)
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let RunArgs { sql, purpose } = parse_args(self.name(), args)?;
        let problems = syntax_problems(&sql);
        if !problems.is_empty() {
            return Ok(ToolResult::validation(
                "The query was not executed because it has structural errors.",
                problems,
                "Fix the query and run it again.",
            ));
        }

        let tracker = &self.0.tracker;
        let ticket = match tracker.begin_query(&sql) {
            Ok(ticket) => ticket,
            Err(e) => return Ok(refusal(e)),
        };
        let outcome = self.0.executor.run_query(&sql).await;
        tracker.finish_query(ticket, outcome.is_ok());
        let result = outcome?;

        let executed = tracker.queries_executed();
        let required = tracker.minimum_required();
        info!(
            purpose = purpose.as_deref().unwrap_or(""),
            executed,
            required,
            rows = result.row_count,
            "diagnostic query executed"
        );
        let redacted = redact_query_result(result, &self.0.tools_config);
        Ok(ToolResult::success(json!({
            "result": to_value(&redacted)?,
            "queriesExecuted": executed,
            "minimumRequiredQueries": required,
            "remaining": required.saturating_sub(executed),
        })))
    }
}

// --- record_findings ---

struct RecordFindings(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct FindingsArgs {
    findings: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    root_cause: Option<String>,
}

#[async_trait]
impl Tool for RecordFindings {
    fn name(&self) -> &str {
        "record_findings"
    }

    fn description(&self) -> &str {
        "Records what the diagnostic queries showed so far, with any issues and a suspected root cause."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "findings": { "type": "array", "items": { "type": "string" } },
                "issues": { "type": "array", "items": { "type": "string" } },
                "root_cause": { "type": "string" }
            },
            "required": ["findings"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let FindingsArgs {
            findings,
            issues,
            root_cause,
        } = parse_args(self.name(), args)?;
        let tracker = &self.0.tracker;
        if let Err(e) = tracker.record_findings(findings, issues, root_cause) {
            return Ok(refusal(e));
        }
        Ok(ToolResult::success(json!({
            "phase": tracker.phase(),
            "queriesExecuted": tracker.queries_executed(),
            "minimumRequiredQueries": tracker.minimum_required(),
        })))
    }
}

// --- provide_investigation_recommendations ---

struct ProvideRecommendations(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct RecommendationArgs {
    recommendations: Vec<String>,
    #[serde(default)]
    next_steps: Vec<String>,
    #[serde(default)]
    root_cause: Option<String>,
}

#[async_trait]
impl Tool for ProvideRecommendations {
    fn name(&self) -> &str {
        "provide_investigation_recommendations"
    }

    fn description(&self) -> &str {
        "Concludes the investigation with numbered recommendations and next steps the user can pick by number. Refused until enough diagnostic queries have run."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "recommendations": { "type": "array", "items": { "type": "string" } },
                "next_steps": { "type": "array", "items": { "type": "string" } },
                "root_cause": { "type": "string" }
            },
            "required": ["recommendations"]
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let RecommendationArgs {
            recommendations,
            next_steps,
            root_cause,
        } = parse_args(self.name(), args)?;
        let context =
            match self
                .0
                .tracker
                .provide_recommendations(recommendations, next_steps, root_cause)
            {
                Ok(context) => context,
                Err(e) => return Ok(refusal(e)),
            };
        let data = to_value(&context)?;
        self.0.contexts.push(context).await?;
        Ok(ToolResult::success(data))
    }
}

// --- retrieve_investigation_context ---

struct RetrieveContext(Arc<InvestigationToolkit>);

#[derive(Deserialize)]
struct RetrieveArgs {
    #[serde(default)]
    number: Option<u32>,
}

#[async_trait]
impl Tool for RetrieveContext {
    fn name(&self) -> &str {
        "retrieve_investigation_context"
    }

    fn description(&self) -> &str {
        "Returns the latest investigation's findings and options, or the option matching a number the user replied with."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "number": { "type": "integer", "minimum": 1 }
            }
        })
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::ReadOnly
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let RetrieveArgs { number } = parse_args(self.name(), args)?;
        let contexts = &self.0.contexts;
        let Some(number) = number else {
            return Ok(match contexts.latest().await? {
                Some(context) => ToolResult::success(to_value(&context)?),
                None => ToolResult::success(json!({ "outcome": "no_context" })),
            });
        };
        Ok(match contexts.resolve_number(number).await? {
            found @ Resolution::Found { .. } => ToolResult::success(to_value(&found)?),
            Resolution::NotFound { number, available } => ToolResult::validation(
                format!("Option {number} does not exist in the latest investigation."),
                vec![number.to_string()],
                format!(
                    "Ask the user to choose one of: {}.",
                    available
                        .iter()
                        .map(u32::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ),
            Resolution::NoContext => ToolResult::validation(
                "There is no earlier investigation to pick an option from.",
                vec![number.to_string()],
                "Ask the user what they want to do.",
            ),
        })
    }
}

/// Registers the seven investigation tools.
pub fn register_investigation_tools(registry: &mut ToolRegistry, toolkit: Arc<InvestigationToolkit>) {
    registry.register(Arc::new(StartInvestigation(toolkit.clone())));
    registry.register(Arc::new(FetchObjectSchema(toolkit.clone())));
    registry.register(Arc::new(GenerateDiagnosticQuery(toolkit.clone())));
    registry.register(Arc::new(RunDiagnosticQuery(toolkit.clone())));
    registry.register(Arc::new(RecordFindings(toolkit.clone())));
    registry.register(Arc::new(ProvideRecommendations(toolkit.clone())));
    registry.register(Arc::new(RetrieveContext(toolkit)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_column_strips_direction() {
        assert_eq!(order_column("wait_time DESC"), "wait_time");
        assert_eq!(order_column("  total "), "total");
        assert_eq!(order_column(""), "");
    }

    #[test]
    fn columns_are_bracketed_once() {
        assert_eq!(quote_column("session_id"), "[session_id]");
        assert_eq!(quote_column("[wait type]"), "[wait type]");
    }

    #[test]
    fn evidence_refusal_names_the_shortfall() {
        let result = refusal(InvestigationError::InsufficientEvidence {
            executed: 1,
            required: 3,
        });
        let ToolResult::ValidationFailure { next_step, .. } = result else {
            panic!("expected validation failure");
        };
        assert!(next_step.contains("Run 2 more"));
    }
}
