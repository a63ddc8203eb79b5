// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL tools: validation (no side effects) and execution.

use std::sync::Arc;

use aishell_config::model::ToolsConfig;
use aishell_core::{AiShellError, QueryExecutor};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::redact::redact_query_result;
use crate::result::ToolResult;
use crate::sql::{is_read_only_query, syntax_problems};
use crate::tool::{Tool, ToolAccess, parse_args};

#[derive(Deserialize)]
struct SqlArgs {
    sql: String,
}

fn sql_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "sql": { "type": "string", "description": description }
        },
        "required": ["sql"]
    })
}

/// Structural check of a T-SQL batch.
pub struct ValidateQueryTool;

#[async_trait]
impl Tool for ValidateQueryTool {
    fn name(&self) -> &str {
        "validate_query"
    }

    fn description(&self) -> &str {
        "Checks a T-SQL batch for unterminated literals or comments and unbalanced parentheses, and reports whether it is read-only."
    }

    fn parameters_schema(&self) -> Value {
        sql_schema("T-SQL to check")
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::Validation
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let SqlArgs { sql } = parse_args(self.name(), args)?;
        let problems = syntax_problems(&sql);
        if !problems.is_empty() {
            return Ok(ToolResult::validation(
                "The query has structural errors.",
                problems,
                "Fix the listed problems and call validate_query again before running it.",
            ));
        }
        Ok(ToolResult::success(json!({
            "valid": true,
            "readOnly": is_read_only_query(&sql),
        })))
    }
}

/// Runs SQL through the query executor and returns a redacted result.
pub struct RunQueryTool {
    executor: Arc<dyn QueryExecutor>,
    config: ToolsConfig,
}

impl RunQueryTool {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: ToolsConfig) -> Self {
        Self { executor, config }
    }
}

#[async_trait]
impl Tool for RunQueryTool {
    fn name(&self) -> &str {
        "run_query"
    }

    fn description(&self) -> &str {
        "Executes T-SQL against the active connection and returns rows. Requires user approval unless read-only auto-approval is enabled."
    }

    fn parameters_schema(&self) -> Value {
        sql_schema("T-SQL batch to execute")
    }

    fn access(&self) -> ToolAccess {
        ToolAccess::QueryExecution
    }

    fn sql_argument(&self, args: &Value) -> Option<String> {
        args.get("sql").and_then(Value::as_str).map(str::to_string)
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let SqlArgs { sql } = parse_args(self.name(), args)?;
        let problems = syntax_problems(&sql);
        if !problems.is_empty() {
            return Ok(ToolResult::validation(
                "The query was not executed because it has structural errors.",
                problems,
                "Fix the query and run it again.",
            ));
        }
        let result = self.executor.run_query(&sql).await?;
        let redacted = redact_query_result(result, &self.config);
        Ok(ToolResult::success(
            serde_json::to_value(redacted).map_err(|e| AiShellError::Internal(e.to_string()))?,
        ))
    }
}
