// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators that record what they were asked.

use std::sync::Mutex;

use aishell_core::types::{CreditsStatus, UsageRecord};
use aishell_core::{AiShellError, CreditsAdapter, UsageLogger};
use async_trait::async_trait;

#[derive(Default)]
pub struct RecordingUsageLogger {
    records: Mutex<Vec<UsageRecord>>,
}

impl RecordingUsageLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageLogger for RecordingUsageLogger {
    async fn log_usage(&self, record: UsageRecord) -> Result<(), AiShellError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Credits collaborator returning a fixed, adjustable answer.
pub struct StaticCredits {
    status: Mutex<CreditsStatus>,
}

impl StaticCredits {
    pub fn with_credits(left: f64) -> Self {
        Self {
            status: Mutex::new(CreditsStatus {
                has_credits: left > 0.0,
                credits_left: Some(left),
                message: None,
            }),
        }
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self {
            status: Mutex::new(CreditsStatus {
                has_credits: false,
                credits_left: Some(0.0),
                message: Some(message.into()),
            }),
        }
    }

    pub fn set(&self, status: CreditsStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl CreditsAdapter for StaticCredits {
    async fn check_credits_available(&self) -> Result<CreditsStatus, AiShellError> {
        Ok(self.status.lock().unwrap().clone())
    }
}
