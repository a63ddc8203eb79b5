// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM integrations.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::AiShellError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ModelInfo, ObjectRequest, ProviderRequest, ProviderResponse, ProviderStreamChunk,
};

/// Boxed stream of normalized provider chunks.
pub type ProviderStream =
    Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, AiShellError>> + Send>>;

/// Adapter for an LLM provider.
///
/// Implementations normalize their own error shapes into
/// [`AiShellError::Provider`] with the HTTP status attached when known,
/// so rate-limit classification works uniformly.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, AiShellError>;

    /// Sends a completion request and returns a stream of response chunks.
    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, AiShellError>;

    /// Generates a JSON value conforming to `request.schema`.
    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> Result<serde_json::Value, AiShellError>;

    /// Lists models the provider currently serves.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, AiShellError>;
}
