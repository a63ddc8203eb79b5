// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Closed set of tool outcomes returned to the model.

use aishell_core::ContentBlock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a tool call produced.
///
/// Every variant serializes with a `status` tag so the model sees a stable
/// shape regardless of which tool ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        data: Value,
    },
    Error {
        message: String,
    },
    /// The user refused permission. Not an error: the model should
    /// acknowledge and offer alternatives.
    Declined {
        message: String,
    },
    /// Arguments referenced something that does not exist.
    ValidationFailure {
        message: String,
        invalid: Vec<String>,
        next_step: String,
    },
}

impl ToolResult {
    pub fn success(data: impl Into<Value>) -> Self {
        Self::Success { data: data.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn declined(tool: &str) -> Self {
        Self::Declined {
            message: format!(
                "The user declined permission to run {tool}. Do not retry it; acknowledge and suggest an alternative."
            ),
        }
    }

    pub fn validation(
        message: impl Into<String>,
        invalid: Vec<String>,
        next_step: impl Into<String>,
    ) -> Self {
        Self::ValidationFailure {
            message: message.into(),
            invalid,
            next_step: next_step.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// JSON text handed back to the model.
    pub fn to_model_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"error"}"#.to_string())
    }

    /// Provider content block answering `tool_use_id`.
    pub fn to_content_block(&self, tool_use_id: &str) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: self.to_model_text(),
            is_error: self.is_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variants_are_tagged_by_status() {
        let v = serde_json::to_value(ToolResult::success(json!({"rows": 1}))).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["data"]["rows"], 1);

        let v = serde_json::to_value(ToolResult::validation(
            "unknown column",
            vec!["blocking_id".into()],
            "use blocking_session_id",
        ))
        .unwrap();
        assert_eq!(v["status"], "validation_failure");
        assert_eq!(v["invalid"][0], "blocking_id");
        assert_eq!(v["next_step"], "use blocking_session_id");
    }

    #[test]
    fn declined_is_not_an_error_block() {
        let block = ToolResult::declined("run_query").to_content_block("call-9");
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                content,
            } => {
                assert_eq!(tool_use_id, "call-9");
                assert!(!is_error);
                assert!(content.contains("declined"));
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn error_sets_error_flag() {
        let block = ToolResult::error("boom").to_content_block("x");
        assert!(matches!(block, ContentBlock::ToolResult { is_error: true, .. }));
    }
}
