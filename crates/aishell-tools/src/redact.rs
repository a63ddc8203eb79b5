// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shrinks query results before they are shown to the model.

use aishell_config::model::ToolsConfig;
use aishell_core::types::QueryResult;
use serde::Serialize;
use serde_json::{Map, Value};

const PLAN_PREFIX: &str = "<ShowPlanXML";

/// A query result sized for the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedResult {
    pub fields: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: u64,
    /// Rows dropped by the row cap.
    pub omitted_rows: u64,
    /// Columns whose execution-plan payloads were replaced.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redacted_columns: Vec<String>,
}

fn is_plan_column(name: &str) -> bool {
    name.to_ascii_lowercase().contains("plan")
}

fn shorten(text: &str, max_chars: usize) -> Option<String> {
    let total = text.chars().count();
    if total <= max_chars {
        return None;
    }
    let kept: String = text.chars().take(max_chars).collect();
    Some(format!("{kept}…[{} more chars]", total - max_chars))
}

fn redact_cell(
    column: &str,
    value: Value,
    config: &ToolsConfig,
    redacted_columns: &mut Vec<String>,
) -> Value {
    let Value::String(text) = value else {
        return value;
    };
    let oversized = text.chars().count() > config.max_cell_chars;
    if text.trim_start().starts_with(PLAN_PREFIX) || (is_plan_column(column) && oversized) {
        if !redacted_columns.iter().any(|c| c == column) {
            redacted_columns.push(column.to_string());
        }
        return Value::String(format!(
            "[execution plan omitted: {} chars]",
            text.chars().count()
        ));
    }
    match shorten(&text, config.max_cell_chars) {
        Some(short) => Value::String(short),
        None => Value::String(text),
    }
}

/// Caps rows and cells and replaces execution-plan payloads with a size note.
pub fn redact_query_result(result: QueryResult, config: &ToolsConfig) -> RedactedResult {
    let total_rows = result.rows.len() as u64;
    let row_count = result.row_count.max(total_rows);
    let mut redacted_columns: Vec<String> = Vec::new();

    let mut rows = Vec::with_capacity(result.rows.len().min(config.max_result_rows));
    for row in result.rows.into_iter().take(config.max_result_rows) {
        let row: Map<String, Value> = row
            .into_iter()
            .map(|(column, value)| {
                let value = redact_cell(&column, value, config, &mut redacted_columns);
                (column, value)
            })
            .collect();
        rows.push(row);
    }

    let omitted_rows = total_rows.saturating_sub(rows.len() as u64);
    RedactedResult {
        fields: result.fields,
        rows,
        row_count,
        omitted_rows,
        redacted_columns,
    }
}
