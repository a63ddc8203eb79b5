// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the conversation core and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter in the plugin registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
}

// --- Conversation model ---

/// Author of a conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A structured part of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// A tool call issued by the model, optionally carrying its result.
    ToolInvocation {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// Any part kind the core does not interpret (reasoning, files, sources).
    Other {
        kind: String,
        #[serde(default)]
        data: Value,
    },
}

/// Message body: either plain text or a list of structured parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated visible text, ignoring non-text parts.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// True when there is no visible text and no structured part worth keeping.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Parts(parts) => parts.iter().all(|p| match p {
                ContentPart::Text { text } => text.trim().is_empty(),
                ContentPart::ToolInvocation { .. } => false,
                ContentPart::Other { .. } => true,
            }),
        }
    }

    /// Tool invocation parts, in order.
    pub fn tool_invocations(&self) -> Vec<&ContentPart> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, ContentPart::ToolInvocation { .. }))
                .collect(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A message in the canonical in-memory conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    /// Originating tool for `tool`-role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            tool_name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into())
    }

    pub fn tool(tool_name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, text.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = MessageId(id.into());
        self
    }

    /// A message counts toward persistence only when it is a user or
    /// assistant message with visible content.
    pub fn is_meaningful(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant) && !self.content.is_blank()
    }
}

/// Provider and model selection for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    pub provider_id: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl SendOptions {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            system_prompt: None,
            temperature: None,
        }
    }

    /// The `provider:model` key used for cooldown and spacing bookkeeping.
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider_id, self.model_id)
    }
}

/// A sanitized, provider-safe message ready for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
}

// --- Provider wire model ---

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }
}

/// A content block inside a provider message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A message in a provider request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// "system", "user" or "assistant".
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ProviderMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

impl From<&OutboundMessage> for ProviderMessage {
    fn from(msg: &OutboundMessage) -> Self {
        Self::text(msg.role, msg.content.clone())
    }
}

/// A tool the model may call, with its JSON input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A request to an LLM provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub tools: Vec<ToolDefinition>,
}

/// A complete (non-streaming) response from an LLM provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Kinds of streaming events normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    MessageStart,
    ContentBlockDelta,
    ContentBlockStop,
    MessageDelta,
    MessageStop,
    Error,
}

/// A completed tool call extracted from a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseData {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// A single chunk from a streaming provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStreamChunk {
    pub event_type: StreamEventType,
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
    pub tool_use: Option<ToolUseData>,
    pub stop_reason: Option<String>,
}

impl ProviderStreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            event_type: StreamEventType::ContentBlockDelta,
            text: Some(text.into()),
            usage: None,
            error: None,
            tool_use: None,
            stop_reason: None,
        }
    }

    pub fn tool_use(data: ToolUseData) -> Self {
        Self {
            event_type: StreamEventType::ContentBlockStop,
            text: None,
            usage: None,
            error: None,
            tool_use: Some(data),
            stop_reason: None,
        }
    }

    pub fn stop(stop_reason: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            event_type: StreamEventType::MessageStop,
            text: None,
            usage: Some(usage),
            error: None,
            tool_use: None,
            stop_reason: Some(stop_reason.into()),
        }
    }
}

/// A structured-object generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRequest {
    pub model: String,
    pub schema: Value,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
}

/// A model advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// --- Host and database collaborators ---

/// Rows returned by the query execution collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub fields: Vec<String>,
    pub rows: Vec<serde_json::Map<String, Value>>,
    pub row_count: u64,
}

/// A column of a database object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

/// Column listing for a table, view or catalog object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub object: String,
    pub columns: Vec<ColumnInfo>,
}

impl ObjectSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// An editor tab in the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub database: Option<String>,
}

/// Editor text with the cursor offset (in chars).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTextWithCursor {
    pub text: String,
    pub cursor: usize,
}

/// Answer of the credits collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsStatus {
    pub has_credits: bool,
    #[serde(default)]
    pub credits_left: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Category of a user-facing notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
    RateLimit,
    Fallback,
    Credits,
    Busy,
}

/// A fire-and-forget broadcast to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub payload: Value,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// One turn's usage report for the telemetry collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn content_accepts_string_or_parts() {
        let text: MessageContent = serde_json::from_value(json!("hi")).unwrap();
        assert_eq!(text, MessageContent::Text("hi".into()));

        let parts: MessageContent = serde_json::from_value(json!([
            {"type": "text", "text": "a"},
            {"type": "tool_invocation", "tool_call_id": "c1", "tool_name": "run_query", "args": {}},
            {"type": "other", "kind": "reasoning"}
        ]))
        .unwrap();
        match parts {
            MessageContent::Parts(p) => assert_eq!(p.len(), 3),
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[test]
    fn blank_detection() {
        assert!(MessageContent::Text("   \n".into()).is_blank());
        assert!(
            MessageContent::Parts(vec![ContentPart::Other {
                kind: "reasoning".into(),
                data: Value::Null
            }])
            .is_blank()
        );
        assert!(
            !MessageContent::Parts(vec![ContentPart::ToolInvocation {
                tool_call_id: "1".into(),
                tool_name: "x".into(),
                args: json!({}),
                result: None,
            }])
            .is_blank()
        );
    }

    #[test]
    fn meaningful_messages() {
        assert!(ConversationMessage::user("hello").is_meaningful());
        assert!(!ConversationMessage::user("  ").is_meaningful());
        assert!(!ConversationMessage::system("prompt").is_meaningful());
        assert!(!ConversationMessage::tool("run_query", "rows").is_meaningful());
    }

    #[test]
    fn send_options_key() {
        let opts = SendOptions::new("anthropic", "claude-sonnet-4");
        assert_eq!(opts.key(), "anthropic:claude-sonnet-4");
    }

    #[test]
    fn object_schema_column_lookup_is_case_insensitive() {
        let schema = ObjectSchema {
            object: "sys.dm_exec_requests".into(),
            columns: vec![ColumnInfo {
                name: "session_id".into(),
                data_type: "smallint".into(),
                nullable: false,
            }],
        };
        assert!(schema.has_column("SESSION_ID"));
        assert!(!schema.has_column("blocking_session"));
    }
}
