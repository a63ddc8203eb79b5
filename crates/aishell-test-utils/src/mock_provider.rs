// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted provider adapter.
//!
//! Each `stream` call pops the next [`Scripted`] reply. Requests are
//! recorded so tests can inspect exactly what would have gone on the wire.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aishell_core::types::{
    ModelInfo, ObjectRequest, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    StreamEventType, ToolUseData,
};
use aishell_core::{
    AdapterType, AiShellError, HealthStatus, PluginAdapter, ProviderAdapter, ProviderStream,
    TokenUsage,
};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use tokio::sync::Notify;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    /// Optional lead-in text followed by tool calls `(name, input)`.
    ToolCalls(String, Vec<(String, Value)>),
    /// A reply with no text and no usage.
    Empty,
    /// `stream` fails with a provider error.
    Error { status: Option<u16>, message: String },
}

impl Scripted {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool(name: impl Into<String>, input: Value) -> Self {
        Self::ToolCalls(String::new(), vec![(name.into(), input)])
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::Error {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// Usage reported for every non-empty reply.
pub const MOCK_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
    cache_read_tokens: 0,
    cache_creation_tokens: 0,
};

pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
    object_replies: Mutex<VecDeque<Result<Value, String>>>,
    hold: Mutex<Option<Arc<Notify>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    tool_ids: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            object_replies: Mutex::new(VecDeque::new()),
            hold: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            tool_ids: AtomicUsize::new(0),
        }
    }

    pub fn with_script(script: Vec<Scripted>) -> Self {
        let provider = Self::new();
        provider.push_all(script);
        provider
    }

    pub fn push(&self, reply: Scripted) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn push_all(&self, replies: Vec<Scripted>) {
        self.script.lock().unwrap().extend(replies);
    }

    /// Queues a `generate_object` reply; `Err` text becomes a provider error.
    pub fn push_object(&self, reply: Result<Value, String>) {
        self.object_replies.lock().unwrap().push_back(reply);
    }

    /// The next `stream` call waits until the returned handle is notified.
    pub fn hold_next(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Highest number of `stream` calls that overlapped.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn next_tool_id(&self) -> String {
        format!("toolu_{}", self.tool_ids.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn chunks(&self, reply: Scripted) -> Vec<Result<ProviderStreamChunk, AiShellError>> {
        let start = ProviderStreamChunk {
            event_type: StreamEventType::MessageStart,
            text: None,
            usage: None,
            error: None,
            tool_use: None,
            stop_reason: None,
        };
        match reply {
            Scripted::Text(text) => vec![
                Ok(start),
                Ok(ProviderStreamChunk::text(text)),
                Ok(ProviderStreamChunk::stop("end_turn", MOCK_USAGE)),
            ],
            Scripted::ToolCalls(text, calls) => {
                let mut chunks = vec![Ok(start)];
                if !text.is_empty() {
                    chunks.push(Ok(ProviderStreamChunk::text(text)));
                }
                for (name, input) in calls {
                    chunks.push(Ok(ProviderStreamChunk::tool_use(ToolUseData {
                        id: self.next_tool_id(),
                        name,
                        input,
                    })));
                }
                chunks.push(Ok(ProviderStreamChunk::stop("tool_use", MOCK_USAGE)));
                chunks
            }
            Scripted::Empty => vec![
                Ok(start),
                Ok(ProviderStreamChunk::stop("end_turn", TokenUsage::default())),
            ],
            Scripted::Error { .. } => Vec::new(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, AiShellError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AiShellError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, AiShellError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::text("mock response"));
        match reply {
            Scripted::Error { status, message } => Err(AiShellError::Provider {
                message,
                status,
                source: None,
            }),
            Scripted::Text(text) | Scripted::ToolCalls(text, _) => Ok(ProviderResponse {
                id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
                content: text,
                model,
                stop_reason: Some("end_turn".to_string()),
                usage: MOCK_USAGE,
            }),
            Scripted::Empty => Ok(ProviderResponse {
                id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
                content: String::new(),
                model,
                stop_reason: Some("end_turn".to_string()),
                usage: TokenUsage::default(),
            }),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, AiShellError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let hold = self.hold.lock().unwrap().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::text("mock response"));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Scripted::Error { status, message } = reply {
            return Err(AiShellError::Provider {
                message,
                status,
                source: None,
            });
        }
        Ok(Box::pin(stream::iter(self.chunks(reply))))
    }

    async fn generate_object(&self, request: ObjectRequest) -> Result<Value, AiShellError> {
        let _ = request;
        match self.object_replies.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(AiShellError::provider(message)),
            None => Err(AiShellError::provider("no object reply scripted")),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, AiShellError> {
        Ok(vec![ModelInfo {
            id: "mock-model".to_string(),
            display_name: Some("Mock".to_string()),
        }])
    }
}
