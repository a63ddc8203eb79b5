// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic provider adapter for AI Shell.
//!
//! Implements [`ProviderAdapter`] over the Messages API: one-shot
//! completion, SSE streaming with tool-call accumulation, structured
//! object generation through a forced tool, and model listing.

pub mod client;
pub mod sse;
pub mod types;

use std::collections::HashMap;

use aishell_config::model::AnthropicConfig;
use aishell_core::types::{
    AdapterType, ContentBlock, HealthStatus, ModelInfo, ObjectRequest, ProviderMessage,
    ProviderRequest, ProviderResponse, ProviderStreamChunk, StreamEventType, TokenUsage,
    ToolUseData,
};
use aishell_core::{AiShellError, PluginAdapter, ProviderAdapter, ProviderStream};
use async_trait::async_trait;
use futures::stream::StreamExt;
use tracing::{debug, info, warn};

use crate::client::AnthropicClient;
use crate::sse::StreamEvent;
use crate::types::{
    ApiContent, ApiContentBlock, ApiMessage, ApiUsage, MessageRequest, ResponseContentBlock,
    SseDelta, ToolChoice, ToolDefinition,
};

/// Tool the model is forced to call when generating a structured object.
const OBJECT_TOOL: &str = "emit_object";

pub struct AnthropicProvider {
    client: AnthropicClient,
    default_model: String,
}

impl AnthropicProvider {
    /// Builds the provider. The key comes from config, then the
    /// `ANTHROPIC_API_KEY` environment variable.
    pub fn new(config: &AnthropicConfig) -> Result<Self, AiShellError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = AnthropicClient::new(&api_key, &config.api_version, &config.base_url)?;
        info!(model = %config.default_model, "Anthropic provider initialized");
        Ok(Self {
            client,
            default_model: config.default_model.clone(),
        })
    }

    pub fn with_client(client: AnthropicClient, default_model: impl Into<String>) -> Self {
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    fn model_for(&self, requested: &str) -> String {
        if requested.is_empty() {
            self.default_model.clone()
        } else {
            requested.to_string()
        }
    }

    fn to_message_request(&self, request: &ProviderRequest) -> MessageRequest {
        let (system, messages) = split_system(request.system_prompt.as_deref(), &request.messages);
        let tools: Vec<ToolDefinition> = request
            .tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        MessageRequest {
            model: self.model_for(&request.model),
            messages,
            system,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: request.stream,
            tools: (!tools.is_empty()).then_some(tools),
            tool_choice: None,
        }
    }
}

/// The Messages API takes the system prompt out of band, so system-role
/// messages are folded into it.
fn split_system(
    system_prompt: Option<&str>,
    messages: &[ProviderMessage],
) -> (Option<String>, Vec<ApiMessage>) {
    let mut system_parts: Vec<String> = system_prompt
        .filter(|s| !s.trim().is_empty())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default();
    let mut api_messages = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == "system" {
            system_parts.extend(message.content.iter().filter_map(|b| match b {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.clone()),
                _ => None,
            }));
            continue;
        }
        api_messages.push(ApiMessage {
            role: message.role.clone(),
            content: convert_content_blocks(&message.content),
        });
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, api_messages)
}

fn convert_content_blocks(blocks: &[ContentBlock]) -> ApiContent {
    if let [ContentBlock::Text { text }] = blocks {
        return ApiContent::Text(text.clone());
    }
    ApiContent::Blocks(
        blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => ApiContentBlock::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => ApiContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => ApiContentBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                },
            })
            .collect(),
    )
}

fn to_usage(u: &ApiUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
        cache_read_tokens: u.cache_read_input_tokens,
        cache_creation_tokens: u.cache_creation_input_tokens,
    }
}

fn resolve_api_key(config_key: Option<&str>) -> Result<String, AiShellError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }
    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        AiShellError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or the ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

/// Per-stream bookkeeping: tool blocks under construction and the usage
/// seen so far.
#[derive(Default)]
struct StreamState {
    tool_blocks: HashMap<usize, (String, String, String)>,
    usage: TokenUsage,
    stop_reason: Option<String>,
}

impl StreamState {
    fn map(&mut self, event: StreamEvent) -> Option<Result<ProviderStreamChunk, AiShellError>> {
        match event {
            StreamEvent::MessageStart(start) => {
                self.usage = to_usage(&start.message.usage);
                Some(Ok(ProviderStreamChunk {
                    event_type: StreamEventType::MessageStart,
                    text: None,
                    usage: Some(self.usage),
                    error: None,
                    tool_use: None,
                    stop_reason: None,
                }))
            }
            StreamEvent::ContentBlockStart(start) => {
                if let ResponseContentBlock::ToolUse { id, name, .. } = start.content_block {
                    self.tool_blocks.insert(start.index, (id, name, String::new()));
                }
                None
            }
            StreamEvent::ContentBlockDelta(delta) => match delta.delta {
                SseDelta::TextDelta { text } => Some(Ok(ProviderStreamChunk::text(text))),
                SseDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, _, json)) = self.tool_blocks.get_mut(&delta.index) {
                        json.push_str(&partial_json);
                    }
                    None
                }
                SseDelta::Other => None,
            },
            StreamEvent::ContentBlockStop(stop) => {
                let (id, name, json) = self.tool_blocks.remove(&stop.index)?;
                let input = if json.trim().is_empty() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    match serde_json::from_str(&json) {
                        Ok(input) => input,
                        Err(e) => {
                            warn!(error = %e, tool = %name, "tool input JSON did not parse");
                            serde_json::json!({ "_parse_error": e.to_string(), "_raw": json })
                        }
                    }
                };
                Some(Ok(ProviderStreamChunk::tool_use(ToolUseData { id, name, input })))
            }
            StreamEvent::MessageDelta(delta) => {
                if let Some(u) = &delta.usage {
                    // Output tokens are cumulative; input is only sent up front.
                    self.usage.output_tokens = u.output_tokens;
                    if u.input_tokens > 0 {
                        self.usage.input_tokens = u.input_tokens;
                    }
                }
                if delta.delta.stop_reason.is_some() {
                    self.stop_reason = delta.delta.stop_reason.clone();
                }
                Some(Ok(ProviderStreamChunk {
                    event_type: StreamEventType::MessageDelta,
                    text: None,
                    usage: delta.usage.as_ref().map(to_usage),
                    error: None,
                    tool_use: None,
                    stop_reason: delta.delta.stop_reason,
                }))
            }
            StreamEvent::MessageStop => Some(Ok(ProviderStreamChunk::stop(
                self.stop_reason.clone().unwrap_or_else(|| "end_turn".to_string()),
                self.usage,
            ))),
            StreamEvent::Error(err) => Some(Ok(ProviderStreamChunk {
                event_type: StreamEventType::Error,
                text: None,
                usage: None,
                error: Some(format!("{}: {}", err.error.type_, err.error.message)),
                tool_use: None,
                stop_reason: None,
            })),
            StreamEvent::Ping => None,
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, AiShellError> {
        // No request: health checks should not spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AiShellError> {
        debug!("Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, AiShellError> {
        let api_request = self.to_message_request(&request);
        let response = self.client.complete_message(&api_request).await?;
        let content = response
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<String>();
        Ok(ProviderResponse {
            id: response.id,
            content,
            model: response.model,
            stop_reason: response.stop_reason,
            usage: to_usage(&response.usage),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, AiShellError> {
        let api_request = self.to_message_request(&request);
        let events = self.client.stream_message(&api_request).await?;
        let mut state = StreamState::default();
        let chunks = events.filter_map(move |result| {
            let chunk = match result {
                Ok(event) => state.map(event),
                Err(e) => Some(Err(e)),
            };
            async move { chunk }
        });
        Ok(Box::pin(chunks))
    }

    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> Result<serde_json::Value, AiShellError> {
        let api_request = MessageRequest {
            model: self.model_for(&request.model),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: ApiContent::Text(request.prompt),
            }],
            system: request.system_prompt,
            max_tokens: request.max_tokens,
            temperature: None,
            stream: false,
            tools: Some(vec![ToolDefinition {
                name: OBJECT_TOOL.into(),
                description: "Return the requested object.".into(),
                input_schema: request.schema,
            }]),
            tool_choice: Some(ToolChoice::tool(OBJECT_TOOL)),
        };
        let response = self.client.complete_message(&api_request).await?;
        response
            .content
            .into_iter()
            .find_map(|block| match block {
                ResponseContentBlock::ToolUse { name, input, .. } if name == OBJECT_TOOL => {
                    Some(input)
                }
                _ => None,
            })
            .ok_or_else(|| AiShellError::provider("model did not return a structured object"))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, AiShellError> {
        Ok(self
            .client
            .list_models()
            .await?
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                display_name: m.display_name,
            })
            .collect())
    }
}
