// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Editor and tab tools backed by the host bridge.

use std::sync::Arc;

use aishell_core::{AiShellError, HostBridge};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::result::ToolResult;
use crate::tool::{Tool, ToolAccess, ToolRegistry, parse_args};

/// One host capability exposed as a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    GetQueryText,
    GetQueryTextWithCursor,
    GetExecutionPlan,
    GetStatistics,
    GetMessages,
    GetTabList,
    GetActiveDatabase,
    InsertText,
    InsertTextAtCursor,
    SetQueryText,
    SwitchToTab,
}

impl HostOp {
    pub const ALL: [HostOp; 11] = [
        Self::GetQueryText,
        Self::GetQueryTextWithCursor,
        Self::GetExecutionPlan,
        Self::GetStatistics,
        Self::GetMessages,
        Self::GetTabList,
        Self::GetActiveDatabase,
        Self::InsertText,
        Self::InsertTextAtCursor,
        Self::SetQueryText,
        Self::SwitchToTab,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GetQueryText => "get_query_text",
            Self::GetQueryTextWithCursor => "get_query_text_with_cursor",
            Self::GetExecutionPlan => "get_execution_plan",
            Self::GetStatistics => "get_statistics",
            Self::GetMessages => "get_messages",
            Self::GetTabList => "get_tab_list",
            Self::GetActiveDatabase => "get_active_database",
            Self::InsertText => "insert_text",
            Self::InsertTextAtCursor => "insert_text_at_cursor",
            Self::SetQueryText => "set_query_text",
            Self::SwitchToTab => "switch_to_tab",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::GetQueryText => "Returns the full text of the active query editor.",
            Self::GetQueryTextWithCursor => {
                "Returns the active editor text and the cursor offset in characters."
            }
            Self::GetExecutionPlan => "Returns the execution plan of the last executed query.",
            Self::GetStatistics => {
                "Returns IO and time statistics captured for the last executed query."
            }
            Self::GetMessages => "Returns the messages pane output (errors, row counts, prints).",
            Self::GetTabList => "Lists open query tabs with their titles and databases.",
            Self::GetActiveDatabase => "Returns the database the active tab is connected to.",
            Self::InsertText => "Appends text to the end of the active query editor.",
            Self::InsertTextAtCursor => "Inserts text at the cursor in the active query editor.",
            Self::SetQueryText => "Replaces the entire text of the active query editor.",
            Self::SwitchToTab => "Activates the query tab with the given id.",
        }
    }

    fn access(self) -> ToolAccess {
        match self {
            Self::InsertText | Self::InsertTextAtCursor | Self::SetQueryText | Self::SwitchToTab => {
                ToolAccess::Mutating
            }
            _ => ToolAccess::ReadOnly,
        }
    }

    fn schema(self) -> Value {
        match self {
            Self::InsertText | Self::InsertTextAtCursor | Self::SetQueryText => json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "SQL text to write into the editor" }
                },
                "required": ["text"]
            }),
            Self::SwitchToTab => json!({
                "type": "object",
                "properties": {
                    "tab_id": { "type": "string", "description": "Id from get_tab_list" }
                },
                "required": ["tab_id"]
            }),
            _ => json!({ "type": "object", "properties": {} }),
        }
    }
}

#[derive(Deserialize)]
struct TextArgs {
    text: String,
}

#[derive(Deserialize)]
struct TabArgs {
    tab_id: String,
}

pub struct HostTool {
    op: HostOp,
    host: Arc<dyn HostBridge>,
}

impl HostTool {
    pub fn new(op: HostOp, host: Arc<dyn HostBridge>) -> Self {
        Self { op, host }
    }
}

#[async_trait]
impl Tool for HostTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        self.op.schema()
    }

    fn access(&self) -> ToolAccess {
        self.op.access()
    }

    fn sql_argument(&self, args: &Value) -> Option<String> {
        args.get("text").and_then(Value::as_str).map(str::to_string)
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, AiShellError> {
        let name = self.op.name();
        let data = match self.op {
            HostOp::GetQueryText => json!({ "text": self.host.get_query_text().await? }),
            HostOp::GetQueryTextWithCursor => {
                serde_json::to_value(self.host.get_query_text_with_cursor().await?)
                    .map_err(|e| AiShellError::Internal(e.to_string()))?
            }
            HostOp::GetExecutionPlan => self.host.get_execution_plan().await?,
            HostOp::GetStatistics => self.host.get_statistics_data().await?,
            HostOp::GetMessages => self.host.get_messages_data().await?,
            HostOp::GetTabList => json!({ "tabs": self.host.get_tab_list().await? }),
            HostOp::GetActiveDatabase => {
                json!({ "database": self.host.get_active_database().await? })
            }
            HostOp::InsertText => {
                let TextArgs { text } = parse_args(name, args)?;
                self.host.insert_text(&text).await?;
                json!({ "inserted": text.chars().count() })
            }
            HostOp::InsertTextAtCursor => {
                let TextArgs { text } = parse_args(name, args)?;
                self.host.insert_text_at_cursor(&text).await?;
                json!({ "inserted": text.chars().count() })
            }
            HostOp::SetQueryText => {
                let TextArgs { text } = parse_args(name, args)?;
                self.host.set_query_text(&text).await?;
                json!({ "replaced": true })
            }
            HostOp::SwitchToTab => {
                let TabArgs { tab_id } = parse_args(name, args)?;
                let tabs = self.host.get_tab_list().await?;
                if !tabs.iter().any(|t| t.id == tab_id) {
                    return Ok(ToolResult::validation(
                        format!("No open tab with id '{tab_id}'"),
                        vec![tab_id],
                        "Call get_tab_list and use one of the returned ids.",
                    ));
                }
                self.host.switch_to_tab(&tab_id).await?;
                json!({ "active": tab_id })
            }
        };
        Ok(ToolResult::success(data))
    }
}

/// Registers every host tool.
pub fn register_host_tools(registry: &mut ToolRegistry, host: Arc<dyn HostBridge>) {
    for op in HostOp::ALL {
        registry.register(Arc::new(HostTool::new(op, host.clone())));
    }
}
