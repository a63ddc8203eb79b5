// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages and Models APIs.
//!
//! Server errors (5xx) are retried once inside the client. Rate limits are
//! not: a 429 is returned immediately with its status and `retry-after`
//! hint so the caller's governor can set a cooldown.

use std::time::Duration;

use aishell_core::AiShellError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Response;
use tracing::{debug, warn};

use crate::sse::{self, EventStream};
use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse, ModelEntry, ModelsResponse};

const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    retry_delay: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: &str, api_version: &str, base_url: &str) -> Result<Self, AiShellError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| AiShellError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version).map_err(|e| {
                AiShellError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| AiShellError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Pause before the internal 5xx retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Posts to `/v1/messages`, retrying once on a server error.
    async fn post_messages(&self, request: &MessageRequest) -> Result<Response, AiShellError> {
        let url = self.url("/v1/messages");
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| AiShellError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    status: None,
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(%status, attempt, stream = request.stream, "messages response");
            if status.is_success() {
                return Ok(response);
            }
            if status.is_server_error() && attempt < MAX_ATTEMPTS {
                let body = response.text().await.unwrap_or_default();
                warn!(%status, body = %body, "server error, retrying");
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }
            return Err(error_from_response(response, attempt).await);
        }
    }

    pub async fn stream_message(&self, request: &MessageRequest) -> Result<EventStream, AiShellError> {
        let mut req = request.clone();
        req.stream = true;
        let response = self.post_messages(&req).await?;
        Ok(sse::parse_sse_stream(response))
    }

    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, AiShellError> {
        let mut req = request.clone();
        req.stream = false;
        let response = self.post_messages(&req).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AiShellError::Provider {
            message: format!("failed to read response body: {e}"),
            status: Some(status),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| AiShellError::Provider {
            message: format!("failed to parse API response: {e}"),
            status: Some(status),
            source: Some(Box::new(e)),
        })
    }

    /// All models visible to the key, following pagination.
    pub async fn list_models(&self) -> Result<Vec<ModelEntry>, AiShellError> {
        let mut models = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut req = self.client.get(self.url("/v1/models")).query(&[("limit", "1000")]);
            if let Some(after_id) = &after {
                req = req.query(&[("after_id", after_id.as_str())]);
            }
            let response = req.send().await.map_err(|e| AiShellError::Provider {
                message: format!("HTTP request failed: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;
            if !response.status().is_success() {
                return Err(error_from_response(response, 1).await);
            }
            let page: ModelsResponse = response.json().await.map_err(|e| AiShellError::Provider {
                message: format!("failed to parse model list: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;
            models.extend(page.data);
            match page.last_id {
                Some(last) if page.has_more => after = Some(last),
                _ => return Ok(models),
            }
        }
    }
}

/// Builds a provider error carrying the status, the API's error type and
/// message, any `retry-after` header, and the attempt count once the
/// internal retry has been spent.
async fn error_from_response(response: Response, attempts: u32) -> AiShellError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();

    let mut message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_err) => format!(
            "Anthropic API error ({}): {}",
            api_err.error.type_, api_err.error.message
        ),
        Err(_) => format!("API returned {status}: {body}"),
    };
    if let Some(wait) = retry_after {
        message.push_str(&format!(" (retry-after: {wait})"));
    }
    if status.is_server_error() && attempts > 1 {
        message.push_str(&format!(" (failed after {attempts} attempts)"));
    }
    AiShellError::provider_status(status.as_u16(), message)
}
