// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget enforcement for an assembled provider request.
//!
//! Inside a turn the tool loop appends tool-use rounds after the sanitized
//! history. The combined message list is fitted again before every request
//! so the same per-message and total budgets hold for what is actually sent.

use aishell_core::{ContentBlock, ProviderMessage, Role};
use tracing::{debug, warn};

use crate::sanitize::{SanitizeConstraints, json_chars, shrink_to_json};
use crate::utf16::scrub_lone_surrogates;

/// Replaces an earlier tool result that no longer fits the request.
pub const OMITTED_RESULT: &str =
    "[earlier tool result omitted to stay within the request budget]";

/// Shrinks the text and tool-result bodies of `msg`, largest first, until it
/// serializes within `budget`. Tool-use inputs are never altered.
pub fn fit_provider_message(msg: &mut ProviderMessage, budget: usize) {
    loop {
        let size = json_chars(msg);
        if size <= budget {
            return;
        }
        let Some(text) = largest_body(msg) else {
            return;
        };
        let current = json_chars(text.as_str());
        // `""`: nothing left to shrink.
        if current <= 2 {
            return;
        }
        let target = current.saturating_sub(size - budget);
        *text = shrink_to_json(text, target, false);
    }
}

/// Builds the message list for one request from the sanitized `history`
/// followed by this turn's tool `rounds`.
///
/// Every message is held to `max_part_json_chars`. Over the total budget,
/// older history goes first (the message that opened the turn stays), then
/// earlier tool results are replaced by [`OMITTED_RESULT`], and finally
/// bodies are shrunk from the newest message backwards. Tool-use and
/// tool-result blocks always stay paired.
pub fn fit_request(
    history: &[ProviderMessage],
    rounds: &[ProviderMessage],
    constraints: &SanitizeConstraints,
) -> Vec<ProviderMessage> {
    let mut out: Vec<ProviderMessage> = history.iter().chain(rounds).cloned().collect();
    for msg in &mut out {
        scrub_bodies(msg);
        fit_provider_message(msg, constraints.max_part_json_chars);
    }

    let cap = constraints.max_total_json_chars;
    let system = Role::System.to_string();
    let leading_system = history.iter().take_while(|m| m.role == system).count();
    let mut first_round = history.len();

    while json_chars(&out) > cap && first_round > leading_system + 1 {
        out.remove(leading_system);
        first_round -= 1;
    }

    let newest = out.len().saturating_sub(1);
    let mut idx = first_round;
    while json_chars(&out) > cap && idx < newest {
        omit_results(&mut out[idx]);
        idx += 1;
    }

    let mut idx = out.len();
    while json_chars(&out) > cap && idx > 0 {
        idx -= 1;
        let excess = json_chars(&out) - cap;
        let current = json_chars(&out[idx]);
        fit_provider_message(&mut out[idx], current.saturating_sub(excess));
    }

    let size = json_chars(&out);
    if size > cap {
        warn!(size, cap, "tool inputs alone exceed the request budget");
    }
    debug!(
        history = history.len(),
        rounds = rounds.len(),
        output = out.len(),
        size,
        "fitted provider request"
    );
    out
}

fn body(block: &mut ContentBlock) -> Option<&mut String> {
    match block {
        ContentBlock::Text { text } => Some(text),
        ContentBlock::ToolResult { content, .. } => Some(content),
        ContentBlock::ToolUse { .. } => None,
    }
}

fn largest_body(msg: &mut ProviderMessage) -> Option<&mut String> {
    msg.content
        .iter_mut()
        .filter_map(body)
        .max_by_key(|text| text.len())
}

fn scrub_bodies(msg: &mut ProviderMessage) {
    for text in msg.content.iter_mut().filter_map(body) {
        *text = scrub_lone_surrogates(text);
    }
}

fn omit_results(msg: &mut ProviderMessage) {
    for block in &mut msg.content {
        if let ContentBlock::ToolResult { content, .. } = block
            && content.len() > OMITTED_RESULT.len()
        {
            *content = OMITTED_RESULT.to_string();
        }
    }
}
