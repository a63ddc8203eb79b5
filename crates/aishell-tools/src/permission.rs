// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-in-the-loop permission handshake for tool calls.
//!
//! A call that needs approval is parked in the pending list and its future
//! suspends until an accept or reject removes it. Each pending call is
//! resolved exactly once; later decisions for the same id are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

/// A tool call waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Accepted,
    Rejected,
}

impl PermissionDecision {
    fn from_permitted(permitted: bool) -> Self {
        if permitted {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }
}

#[derive(Default)]
struct Waiting {
    order: Vec<PendingToolCall>,
    senders: HashMap<String, oneshot::Sender<PermissionDecision>>,
}

impl Waiting {
    fn take(&mut self, id: &str) -> Option<oneshot::Sender<PermissionDecision>> {
        self.order.retain(|p| p.tool_call_id != id);
        self.senders.remove(id)
    }
}

pub struct PermissionBroker {
    waiting: Mutex<Waiting>,
    permitted: AtomicBool,
    pending_tx: watch::Sender<Vec<PendingToolCall>>,
    timeout: Option<Duration>,
}

impl PermissionBroker {
    /// `timeout` bounds how long a call waits; `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        let (pending_tx, _) = watch::channel(Vec::new());
        Self {
            waiting: Mutex::new(Waiting::default()),
            permitted: AtomicBool::new(false),
            pending_tx,
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Waiting> {
        self.waiting.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, waiting: &Waiting) {
        self.pending_tx.send_replace(waiting.order.clone());
    }

    /// Parks `tool_call_id` and waits for a decision.
    pub async fn request(&self, tool_call_id: &str, tool_name: &str) -> PermissionDecision {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiting = self.lock();
            if let Some(previous) = waiting.take(tool_call_id) {
                // A re-request supersedes a stale entry for the same id.
                let _ = previous.send(PermissionDecision::Rejected);
            }
            waiting.order.push(PendingToolCall {
                tool_call_id: tool_call_id.to_string(),
                tool_name: tool_name.to_string(),
                requested_at: Utc::now(),
            });
            waiting.senders.insert(tool_call_id.to_string(), tx);
            self.publish(&waiting);
        }
        info!(tool = tool_name, tool_call_id, "awaiting permission");

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    info!(tool_call_id, "permission request timed out");
                    None
                }
            },
            None => rx.await.ok(),
        };

        // Timed out or the broker dropped the sender: clean up and decline.
        let decision = outcome.unwrap_or(PermissionDecision::Rejected);
        {
            let mut waiting = self.lock();
            if waiting.take(tool_call_id).is_some() {
                self.publish(&waiting);
            }
        }
        debug!(tool_call_id, ?decision, "permission resolved");
        decision
    }

    fn resolve(&self, tool_call_id: &str, decision: PermissionDecision) -> bool {
        let sender = {
            let mut waiting = self.lock();
            let sender = waiting.take(tool_call_id);
            if sender.is_some() {
                self.publish(&waiting);
            }
            sender
        };
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Accepts one pending call. Returns `false` if it was not pending.
    pub fn accept(&self, tool_call_id: &str) -> bool {
        self.permitted.store(true, Ordering::SeqCst);
        self.resolve(tool_call_id, PermissionDecision::Accepted)
    }

    /// Rejects one pending call. Returns `false` if it was not pending.
    pub fn reject(&self, tool_call_id: &str) -> bool {
        self.permitted.store(false, Ordering::SeqCst);
        self.resolve(tool_call_id, PermissionDecision::Rejected)
    }

    /// Removes a call without an explicit verdict; the most recent
    /// accept/reject decides its outcome.
    pub fn dismiss(&self, tool_call_id: &str) -> bool {
        let decision = PermissionDecision::from_permitted(self.permitted.load(Ordering::SeqCst));
        self.resolve(tool_call_id, decision)
    }

    /// Accepts every pending call. Returns how many were resolved.
    pub fn accept_all(&self) -> usize {
        self.permitted.store(true, Ordering::SeqCst);
        self.resolve_all()
    }

    /// Rejects every pending call. Returns how many were resolved.
    pub fn reject_all(&self) -> usize {
        self.permitted.store(false, Ordering::SeqCst);
        self.resolve_all()
    }

    fn resolve_all(&self) -> usize {
        let decision = PermissionDecision::from_permitted(self.permitted.load(Ordering::SeqCst));
        let senders: Vec<_> = {
            let mut waiting = self.lock();
            waiting.order.clear();
            let drained: Vec<_> = waiting.senders.drain().map(|(_, tx)| tx).collect();
            self.publish(&waiting);
            drained
        };
        senders
            .into_iter()
            .map(|tx| tx.send(decision))
            .filter(Result::is_ok)
            .count()
    }

    /// Calls currently waiting, oldest first.
    pub fn pending(&self) -> Vec<PendingToolCall> {
        self.lock().order.clone()
    }

    pub fn is_pending(&self, tool_call_id: &str) -> bool {
        self.lock().senders.contains_key(tool_call_id)
    }

    /// Watches the pending list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<PendingToolCall>> {
        self.pending_tx.subscribe()
    }

    /// Outcome of the most recent accept/reject.
    pub fn permitted(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }
}

impl Default for PermissionBroker {
    fn default() -> Self {
        Self::new(None)
    }
}
