// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget outbound channels: UI notifications and usage telemetry.

use async_trait::async_trait;

use crate::error::AiShellError;
use crate::types::{Notification, UsageRecord};

/// User-facing broadcast. Never fails from the caller's point of view.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Receives one record per completed or failed turn.
#[async_trait]
pub trait UsageLogger: Send + Sync {
    async fn log_usage(&self, record: UsageRecord) -> Result<(), AiShellError>;
}
