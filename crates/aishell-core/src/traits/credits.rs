// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::AiShellError;
use crate::types::CreditsStatus;

/// Remote credit check consulted before every provider request.
#[async_trait]
pub trait CreditsAdapter: Send + Sync {
    async fn check_credits_available(&self) -> Result<CreditsStatus, AiShellError>;
}
