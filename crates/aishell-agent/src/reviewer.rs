// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional reviewer pass.
//!
//! A short structured generation lists pitfalls for the user's request. Any
//! failure yields no notes; the main request goes ahead regardless.

use std::time::Duration;

use aishell_core::ProviderAdapter;
use aishell_core::types::ObjectRequest;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const REVIEW_TIMEOUT: Duration = Duration::from_secs(20);
const REVIEW_MAX_TOKENS: u32 = 512;
const MAX_NOTES: usize = 5;

#[derive(Deserialize)]
struct ReviewerOutput {
    #[serde(default)]
    notes: Vec<String>,
}

/// Asks `provider` for reviewer notes on `request_text`.
pub async fn reviewer_notes(
    provider: &dyn ProviderAdapter,
    model: &str,
    request_text: &str,
) -> Vec<String> {
    let request = ObjectRequest {
        model: model.to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "notes": {
                    "type": "array",
                    "items": { "type": "string" },
                    "maxItems": MAX_NOTES
                }
            },
            "required": ["notes"]
        }),
        prompt: format!(
            "List up to {MAX_NOTES} short pitfalls or edge cases a SQL Server expert should keep in mind when answering:\n\n{request_text}"
        ),
        system_prompt: Some("You review requests before they are answered. Be terse.".to_string()),
        max_tokens: REVIEW_MAX_TOKENS,
    };

    let value = match tokio::time::timeout(REVIEW_TIMEOUT, provider.generate_object(request)).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(error = %e, "reviewer pass failed, continuing without notes");
            return Vec::new();
        }
        Err(_) => {
            warn!("reviewer pass timed out, continuing without notes");
            return Vec::new();
        }
    };

    match serde_json::from_value::<ReviewerOutput>(value) {
        Ok(out) => {
            let notes: Vec<String> = out
                .notes
                .into_iter()
                .filter(|n| !n.trim().is_empty())
                .take(MAX_NOTES)
                .collect();
            debug!(count = notes.len(), "reviewer notes");
            notes
        }
        Err(e) => {
            warn!(error = %e, "reviewer output malformed, continuing without notes");
            Vec::new()
        }
    }
}
