// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for AI Shell.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all AI Shell collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum AiShellError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, non-2xx status, malformed stream).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        /// HTTP-like status code when the provider reported one.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Requested adapter was not found in the registry.
    #[error("adapter not found: {adapter_type}/{name}")]
    AdapterNotFound { adapter_type: String, name: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The host bridge rejected a request or replied with an error payload.
    #[error("host bridge error: {message}")]
    Bridge { message: String },

    /// The credits collaborator reported that no credits are left.
    #[error("credits exhausted: {message}")]
    CreditsExhausted { message: String },

    /// A request was withheld because the (provider, model) pair is cooling down.
    #[error("rate limited, retry in {wait:?}: {message}")]
    RateLimited { wait: Duration, message: String },

    /// Sanitization left no message with visible content.
    #[error("no content to send")]
    NoContentToSend,

    /// A tool failed outside of the structured result path.
    #[error("tool {tool} failed: {message}")]
    Tool { tool: String, message: String },

    /// The operation was aborted by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AiShellError {
    /// Shorthand for a provider error without status or source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Shorthand for a provider error carrying an HTTP status.
    pub fn provider_status(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Returns the provider status code if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
