// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Numbered follow-up options and the bounded stack they are kept on.

use std::sync::{Arc, LazyLock};

use aishell_core::{AiShellError, StorageAdapter};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Storage key holding the serialized stack.
pub const CONTEXT_STACK_KEY: &str = "investigation_context_stack";

static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?\s*(\d{1,4})\s*[.)]?\s*$").unwrap());

/// An option the user can pick by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberedOption {
    pub number: u32,
    pub text: String,
}

impl NumberedOption {
    /// Numbers `texts` from 1, skipping blank entries.
    pub fn number(texts: Vec<String>) -> Vec<Self> {
        texts
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .zip(1..)
            .map(|(text, number)| Self { number, text })
            .collect()
    }
}

/// Outcome of a concluded investigation. Never changed once pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationContext {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<NumberedOption>,
    #[serde(default)]
    pub next_steps: Vec<NumberedOption>,
}

impl InvestigationContext {
    pub fn has_options(&self) -> bool {
        !self.recommendations.is_empty() || !self.next_steps.is_empty()
    }
}

/// Which list a resolved number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    NextStep,
    Recommendation,
}

/// Result of looking up a number the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Found {
        kind: OptionKind,
        option: NumberedOption,
    },
    NotFound {
        number: u32,
        available: Vec<u32>,
    },
    NoContext,
}

/// The whole input is an option number, e.g. `2`, `#2` or `2.`.
pub fn parse_bare_number(input: &str) -> Option<u32> {
    BARE_NUMBER
        .captures(input)
        .and_then(|caps| caps[1].parse().ok())
        .filter(|n| *n > 0)
}

/// Bounded stack of concluded investigations in external storage. Lookups
/// always go against the most recent entry.
#[derive(Clone)]
pub struct ContextStack {
    storage: Arc<dyn StorageAdapter>,
    limit: usize,
}

impl ContextStack {
    pub fn new(storage: Arc<dyn StorageAdapter>, limit: usize) -> Self {
        Self {
            storage,
            limit: limit.max(1),
        }
    }

    async fn load(&self) -> Result<Vec<InvestigationContext>, AiShellError> {
        let Some(value) = self.storage.get_data(CONTEXT_STACK_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_value(value) {
            Ok(stack) => Ok(stack),
            Err(e) => {
                warn!(error = %e, "discarding unreadable investigation context stack");
                Ok(Vec::new())
            }
        }
    }

    /// Appends `context`, dropping the oldest entries past the limit.
    pub async fn push(&self, context: InvestigationContext) -> Result<(), AiShellError> {
        let mut stack = self.load().await?;
        stack.push(context);
        if stack.len() > self.limit {
            let excess = stack.len() - self.limit;
            stack.drain(..excess);
        }
        debug!(depth = stack.len(), "investigation context pushed");
        let value =
            serde_json::to_value(&stack).map_err(|e| AiShellError::Internal(e.to_string()))?;
        self.storage.set_data(CONTEXT_STACK_KEY, value).await
    }

    pub async fn latest(&self) -> Result<Option<InvestigationContext>, AiShellError> {
        Ok(self.load().await?.pop())
    }

    /// Maps `number` onto the latest context. Next steps are checked before
    /// recommendations; an out-of-range number is reported, never guessed.
    pub async fn resolve_number(&self, number: u32) -> Result<Resolution, AiShellError> {
        let Some(context) = self.latest().await? else {
            return Ok(Resolution::NoContext);
        };
        let hit = context
            .next_steps
            .iter()
            .find(|o| o.number == number)
            .map(|o| (OptionKind::NextStep, o))
            .or_else(|| {
                context
                    .recommendations
                    .iter()
                    .find(|o| o.number == number)
                    .map(|o| (OptionKind::Recommendation, o))
            });
        Ok(match hit {
            Some((kind, option)) => Resolution::Found {
                kind,
                option: option.clone(),
            },
            None => {
                let mut available: Vec<u32> = context
                    .next_steps
                    .iter()
                    .chain(&context.recommendations)
                    .map(|o| o.number)
                    .collect();
                available.sort_unstable();
                available.dedup();
                Resolution::NotFound { number, available }
            }
        })
    }
}
