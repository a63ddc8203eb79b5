// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds a provider-safe outbound payload from the canonical history.
//!
//! The canonical messages are only read. Every step works on owned copies:
//! tool messages become labelled assistant text, structured parts collapse
//! to text, long bodies are truncated, empty messages are dropped, the
//! history is windowed and trimmed to the total budget, and a final pass
//! removes lone-surrogate artifacts.

use aishell_config::model::{BudgetConfig, SanitizerConfig};
use aishell_core::{
    AiShellError, ContentPart, ConversationMessage, MessageContent, OutboundMessage, Role,
};
use tracing::debug;

use crate::utf16::{scrub_lone_surrogates, truncate_head, truncate_tail, utf16_len};
use crate::window::window_for_size;

/// Opens the hidden memory block appended to the end of a user message.
/// Content containing it is truncated from the front so the block survives.
pub const LOCAL_MEMORY_MARKER: &str = "<!-- aishell:local-memory -->";

/// Budgets applied to one outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeConstraints {
    /// Longest string content per message, in UTF-16 units.
    pub max_message_chars: usize,
    /// Largest serialized size of one message.
    pub max_part_json_chars: usize,
    /// Largest serialized size of the whole payload.
    pub max_total_json_chars: usize,
    /// Selects the tighter window staircase.
    pub is_anthropic_like: bool,
    /// Body kept when a tool message is rewritten.
    pub tool_body_chars: usize,
}

impl SanitizeConstraints {
    pub fn from_budget(
        budget: &BudgetConfig,
        is_anthropic_like: bool,
        tool_body_chars: usize,
    ) -> Self {
        Self {
            max_message_chars: budget.max_message_chars,
            max_part_json_chars: budget.max_part_json_chars,
            max_total_json_chars: budget.max_total_json_chars,
            is_anthropic_like,
            tool_body_chars,
        }
    }

    /// Picks the budget row for a provider class.
    pub fn for_policy(config: &SanitizerConfig, is_anthropic_like: bool) -> Self {
        let budget = if is_anthropic_like {
            &config.anthropic_like
        } else {
            &config.standard
        };
        Self::from_budget(budget, is_anthropic_like, config.tool_body_chars)
    }
}

/// Serialized size of a value in UTF-16 units.
pub fn json_chars<T: serde::Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_string(value)
        .map(|s| utf16_len(&s))
        .unwrap_or(usize::MAX)
}

/// Transforms `messages` into a payload that satisfies `constraints`.
///
/// Fails with [`AiShellError::NoContentToSend`] when no non-system message
/// with visible text survives.
pub fn sanitize_for_transport(
    messages: &[ConversationMessage],
    constraints: &SanitizeConstraints,
) -> Result<Vec<OutboundMessage>, AiShellError> {
    let input_len = messages.len();

    let mut out: Vec<OutboundMessage> = messages
        .iter()
        .map(|m| to_outbound(m, constraints))
        .filter(|m| !m.content.trim().is_empty())
        .collect();

    for msg in &mut out {
        fit_message(msg, constraints.max_part_json_chars);
    }

    let leading_system = out.iter().take_while(|m| m.role == Role::System).count();

    if let Some(keep) = window_for_size(json_chars(&out), constraints.is_anthropic_like) {
        let tail = out.len() - leading_system;
        if tail > keep {
            out.drain(leading_system..leading_system + (tail - keep));
        }
    }

    // Oldest non-system messages go first; the newest one always stays.
    while json_chars(&out) > constraints.max_total_json_chars && out.len() > leading_system + 1 {
        out.remove(leading_system);
    }

    if json_chars(&out) > constraints.max_total_json_chars {
        fit_total(&mut out, leading_system, constraints.max_total_json_chars);
    }

    for msg in &mut out {
        msg.content = scrub_lone_surrogates(&msg.content);
    }
    out.retain(|m| !m.content.trim().is_empty());

    if !out.iter().any(|m| m.role != Role::System) {
        return Err(AiShellError::NoContentToSend);
    }

    debug!(
        input = input_len,
        output = out.len(),
        size = json_chars(&out),
        anthropic_like = constraints.is_anthropic_like,
        "sanitized outbound payload"
    );
    Ok(out)
}

/// Converts one canonical message into outbound text (steps b to d).
fn to_outbound(msg: &ConversationMessage, constraints: &SanitizeConstraints) -> OutboundMessage {
    let text = flatten(&msg.content);

    if msg.role == Role::Tool {
        let name = msg.tool_name.as_deref().unwrap_or("tool");
        let body = truncate_head(text.trim(), constraints.tool_body_chars);
        return OutboundMessage {
            role: Role::Assistant,
            content: format!("[Tool result: {name}]\n{body}"),
        };
    }

    let content = if text.contains(LOCAL_MEMORY_MARKER) {
        truncate_tail(&text, constraints.max_message_chars)
    } else {
        truncate_head(&text, constraints.max_message_chars)
    };
    OutboundMessage {
        role: msg.role,
        content,
    }
}

/// Collapses structured content into plain text.
///
/// Tool invocations become a short placeholder so no raw call/result pair
/// is replayed to the provider; unknown part kinds are dropped.
fn flatten(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => {
            let mut pieces = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ContentPart::Text { text } if !text.trim().is_empty() => {
                        pieces.push(text.clone());
                    }
                    ContentPart::ToolInvocation { tool_name, .. } => {
                        pieces.push(format!("[Tool call: {tool_name}]"));
                    }
                    _ => {}
                }
            }
            pieces.join("\n")
        }
    }
}

/// Shrinks a message's content until its serialized form fits `budget`.
fn fit_message(msg: &mut OutboundMessage, budget: usize) {
    if json_chars(msg) <= budget {
        return;
    }
    let overhead = json_chars(msg) - json_chars(&msg.content);
    let content_budget = budget.saturating_sub(overhead);
    let keep_tail = msg.content.contains(LOCAL_MEMORY_MARKER);
    msg.content = shrink_to_json(&msg.content, content_budget, keep_tail);
}

/// Truncates `text` until its JSON string encoding is at most `budget` units.
pub(crate) fn shrink_to_json(text: &str, budget: usize, keep_tail: bool) -> String {
    // An empty string still serializes as `""`.
    if budget <= 2 {
        return String::new();
    }
    let mut limit = utf16_len(text).min(budget);
    loop {
        let candidate = if keep_tail {
            truncate_tail(text, limit)
        } else {
            truncate_head(text, limit)
        };
        let size = json_chars(&candidate);
        if size <= budget || limit == 0 {
            return candidate;
        }
        limit = limit.saturating_sub((size - budget).max(1));
    }
}

/// Last resort when the newest message plus the leading system block still
/// exceed the total: shrink the newest message, then the system block from
/// its end, dropping a system message that cannot be made to fit.
fn fit_total(out: &mut Vec<OutboundMessage>, leading_system: usize, cap: usize) {
    if let Some(last) = out.len().checked_sub(1).filter(|i| *i >= leading_system) {
        // `others` already includes brackets and separators.
        let others = json_chars(out) - json_chars(&out[last]);
        fit_message(&mut out[last], cap.saturating_sub(others));
    }

    let mut remaining = leading_system;
    while json_chars(out) > cap && remaining > 0 {
        let idx = remaining - 1;
        let excess = json_chars(out) - cap;
        let current = json_chars(&out[idx]);
        fit_message(&mut out[idx], current.saturating_sub(excess));
        if json_chars(out) > cap || out[idx].content.is_empty() {
            out.remove(idx);
        }
        remaining -= 1;
    }
}
