// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal typed event bus.
//!
//! A single broadcast channel carries user-facing notifications and state
//! changes to whatever UI layer is attached. Publishing never blocks and
//! never fails: with no subscribers, events are dropped.

use aishell_core::{Notification, Notifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEventKind {
    Notification(Notification),
    /// A conversation's turn state changed (`idle`, `sending`, ...).
    TurnState { session_id: String, state: String },
    /// The set of tool calls awaiting a permission decision changed.
    PermissionsPending { tool_call_ids: Vec<String> },
    /// A chat session was written to storage.
    SessionPersisted { session_id: String },
}

/// An event with its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: BusEventKind,
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, kind: BusEventKind) {
        let event = BusEvent {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            kind,
        };
        if self.tx.send(event).is_err() {
            trace!("bus event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for EventBus {
    fn notify(&self, notification: Notification) {
        self.publish(BusEventKind::Notification(notification));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aishell_core::NotificationKind;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.notify(Notification::new(NotificationKind::Fallback, "switched model"));

        let event = rx.recv().await.unwrap();
        match event.kind {
            BusEventKind::Notification(n) => {
                assert_eq!(n.kind, NotificationKind::Fallback);
                assert_eq!(n.message, "switched model");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(BusEventKind::SessionPersisted {
            session_id: "s1".into(),
        });
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = BusEvent {
            id: "1".into(),
            at: Utc::now(),
            kind: BusEventKind::TurnState {
                session_id: "s".into(),
                state: "streaming".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "turn_state");
        assert_eq!(json["state"], "streaming");
    }
}
