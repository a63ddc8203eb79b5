// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for AI Shell.
//!
//! Provides the error type, the conversation and provider data model, and
//! the collaborator traits the orchestration crates are written against.

pub mod error;
pub mod traits;
pub mod types;

pub use error::AiShellError;
pub use types::{
    AdapterType, ContentBlock, ContentPart, ConversationMessage, HealthStatus, MessageContent,
    MessageId, Notification, NotificationKind, OutboundMessage, ProviderMessage, Role,
    SendOptions, SessionId, TokenUsage,
};

pub use traits::{
    CreditsAdapter, HostBridge, Notifier, PluginAdapter, ProviderAdapter, ProviderStream,
    QueryExecutor, StorageAdapter, UsageLogger,
};
