// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session/restore guard.
//!
//! After a restore, a stale rehydration path may fire and hand back an empty
//! or outdated history. For a short window the guard compares external
//! writes with the restored snapshot and overwrites them back when they
//! disagree. An explicit clear switches protection off for a cooldown so an
//! intentionally emptied conversation stays empty.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use aishell_config::model::SessionConfig;
use aishell_context::{json_chars, truncate_head};
use aishell_core::{ContentPart, ConversationMessage, MessageContent, MessageId};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Protection state of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    /// External writes are checked against the snapshot until `guard_until`.
    Restoring { guard_until: Instant },
    /// Protection is off until `until` after an explicit clear.
    Suppressed { until: Instant },
}

impl GuardState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Restoring { .. } => "restoring",
            Self::Suppressed { .. } => "suppressed",
        }
    }
}

/// Why the conversation was emptied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    NewChat,
    SessionDeleted,
    AllSessionsCleared,
}

impl ClearReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewChat => "new_chat",
            Self::SessionDeleted => "session_deleted",
            Self::AllSessionsCleared => "all_sessions_cleared",
        }
    }
}

/// Identity of a message list: count plus first and last ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub count: usize,
    pub first: Option<MessageId>,
    pub last: Option<MessageId>,
}

impl Signature {
    pub fn of(messages: &[ConversationMessage]) -> Self {
        Self {
            count: messages.len(),
            first: messages.first().map(|m| m.id.clone()),
            last: messages.last().map(|m| m.id.clone()),
        }
    }
}

/// What happened to an external write.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalWrite {
    Accepted(Vec<ConversationMessage>),
    /// The write was rejected; the snapshot is the canonical list again and
    /// should be persisted.
    OverwrittenBack(Vec<ConversationMessage>),
}

impl ExternalWrite {
    pub fn messages(&self) -> &[ConversationMessage] {
        match self {
            Self::Accepted(m) | Self::OverwrittenBack(m) => m,
        }
    }

    pub fn into_messages(self) -> Vec<ConversationMessage> {
        match self {
            Self::Accepted(m) | Self::OverwrittenBack(m) => m,
        }
    }
}

struct GuardInner {
    state: GuardState,
    snapshot: Option<Vec<ConversationMessage>>,
}

pub struct RestoreGuard {
    window: Duration,
    clear_cooldown: Duration,
    part_ceiling: usize,
    preview_chars: usize,
    inner: Mutex<GuardInner>,
}

impl RestoreGuard {
    pub fn new(config: &SessionConfig) -> Self {
        let part_ceiling = config.part_size_ceiling.max(64);
        Self {
            window: Duration::from_millis(config.restore_guard_ms),
            clear_cooldown: Duration::from_millis(config.clear_cooldown_ms),
            part_ceiling,
            // Previews must land well under the ceiling or compaction would
            // not be stable across restores.
            preview_chars: config.part_preview_chars.min(part_ceiling / 4).max(16),
            inner: Mutex::new(GuardInner {
                state: GuardState::Idle,
                snapshot: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current state, with expired windows folded back to `Idle`.
    pub fn state(&self) -> GuardState {
        let mut inner = self.lock();
        expire(&mut inner, Instant::now());
        inner.state
    }

    /// Normalizes `snapshot`, caches it and opens the guard window.
    /// Restoring the same snapshot again yields the same list.
    pub fn restore(&self, snapshot: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        let normalized = self.normalize(snapshot);
        let guard_until = Instant::now() + self.window;
        let mut inner = self.lock();
        inner.state = GuardState::Restoring { guard_until };
        inner.snapshot = Some(normalized.clone());
        info!(
            messages = normalized.len(),
            window_ms = self.window.as_millis() as u64,
            "conversation restored, guard open"
        );
        normalized
    }

    /// Applies an external rehydration.
    ///
    /// Inside the window, an empty list or one whose signature disagrees with
    /// the snapshot is overwritten back to the snapshot.
    pub fn protected_set(&self, incoming: Vec<ConversationMessage>) -> ExternalWrite {
        let incoming = self.normalize(incoming);
        let mut inner = self.lock();
        expire(&mut inner, Instant::now());

        let GuardState::Restoring { .. } = inner.state else {
            return ExternalWrite::Accepted(incoming);
        };
        let Some(snapshot) = inner.snapshot.as_ref().filter(|s| !s.is_empty()) else {
            return ExternalWrite::Accepted(incoming);
        };

        if incoming.is_empty() {
            warn!(
                snapshot = snapshot.len(),
                "empty rehydration inside restore window, overwriting back"
            );
            return ExternalWrite::OverwrittenBack(snapshot.clone());
        }
        let expected = Signature::of(snapshot);
        let got = Signature::of(&incoming);
        if got != expected {
            warn!(
                expected = expected.count,
                got = got.count,
                "stale rehydration inside restore window, overwriting back"
            );
            return ExternalWrite::OverwrittenBack(snapshot.clone());
        }
        ExternalWrite::Accepted(incoming)
    }

    /// Drops the snapshot and suppresses protection for the clear cooldown.
    pub fn clear(&self, reason: ClearReason) {
        let until = Instant::now() + self.clear_cooldown;
        let mut inner = self.lock();
        inner.snapshot = None;
        inner.state = GuardState::Suppressed { until };
        info!(reason = reason.as_str(), "conversation cleared, guard suppressed");
    }

    /// A user send closes any open window immediately.
    pub fn note_user_send(&self) {
        let mut inner = self.lock();
        if let GuardState::Restoring { .. } = inner.state {
            debug!("user send closed restore window");
            inner.state = GuardState::Idle;
            inner.snapshot = None;
        }
    }

    fn normalize(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        messages
            .into_iter()
            .enumerate()
            .map(|(i, m)| self.normalize_message(i, m))
            .collect()
    }

    fn normalize_message(&self, index: usize, mut msg: ConversationMessage) -> ConversationMessage {
        if msg.id.0.trim().is_empty() {
            msg.id = MessageId(format!("restored-{index}"));
        }
        msg.content = match msg.content {
            MessageContent::Text(text) => MessageContent::Text(text),
            MessageContent::Parts(parts) => {
                let parts: Vec<ContentPart> = parts
                    .into_iter()
                    .map(|p| compact_part(p, self.part_ceiling, self.preview_chars))
                    .collect();
                if parts.iter().all(|p| matches!(p, ContentPart::Text { .. })) {
                    MessageContent::Text(MessageContent::Parts(parts).text())
                } else {
                    MessageContent::Parts(parts)
                }
            }
        };
        msg
    }
}

fn expire(inner: &mut GuardInner, now: Instant) {
    match inner.state {
        GuardState::Restoring { guard_until } if now >= guard_until => {
            debug!("restore window closed");
            inner.state = GuardState::Idle;
            inner.snapshot = None;
        }
        GuardState::Suppressed { until } if now >= until => {
            inner.state = GuardState::Idle;
        }
        _ => {}
    }
}

/// Shrinks a part above `ceiling` by replacing its payload with a preview.
fn compact_part(part: ContentPart, ceiling: usize, preview: usize) -> ContentPart {
    if json_chars(&part) <= ceiling {
        return part;
    }
    match part {
        ContentPart::Text { text } => ContentPart::Text {
            text: truncate_head(&text, preview),
        },
        ContentPart::ToolInvocation {
            tool_call_id,
            tool_name,
            args,
            result,
        } => ContentPart::ToolInvocation {
            tool_call_id,
            tool_name,
            args: preview_value(args, preview),
            result: result.map(|r| preview_value(r, preview)),
        },
        ContentPart::Other { kind, data } => ContentPart::Other {
            kind,
            data: preview_value(data, preview),
        },
    }
}

fn preview_value(value: Value, preview: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_head(&s, preview)),
        other if json_chars(&other) <= preview => other,
        other => {
            let text = serde_json::to_string(&other).unwrap_or_default();
            Value::String(truncate_head(&text, preview))
        }
    }
}
