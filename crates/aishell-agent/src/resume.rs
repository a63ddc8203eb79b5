// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automatic continuation after a turn that stopped short.
//!
//! Detection sits behind [`ContinuationDetector`] so the text heuristics can
//! be swapped for a structured signal. Scheduling is capped at one
//! continuation per user turn and debounced by a key built from the reason
//! and a hash of the last user message.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::Duration;

use aishell_core::TokenUsage;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

static PROMISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(i will now|i'll now|now i will|now i'll|let me (now )?(run|check|query|fetch|look|examine|investigate)|next,? i('ll| will)|i am going to|i'm going to)\b",
    )
    .unwrap()
});

/// Why a turn should be continued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeReason {
    /// No visible text and no token usage at all.
    EmptyTurn,
    /// Tools ran but no analysis followed.
    ToolOnly,
    /// An open investigation is below its evidence minimum.
    InvestigationIncomplete,
    /// The text announces a next step that never happened.
    PromisedNextStep,
}

impl ResumeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyTurn => "empty_turn",
            Self::ToolOnly => "tool_only",
            Self::InvestigationIncomplete => "investigation_incomplete",
            Self::PromisedNextStep => "promised_next_step",
        }
    }

    /// User message sent on the assistant's behalf to continue.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::EmptyTurn => "Please continue with your previous answer.",
            Self::ToolOnly => {
                "Please analyze the tool results above and continue with the next step."
            }
            Self::InvestigationIncomplete => {
                "Continue the investigation: run the remaining diagnostic queries before concluding."
            }
            Self::PromisedNextStep => "Please go ahead with the step you described.",
        }
    }
}

/// What a finished turn looked like.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnDigest {
    /// Text of the final model response.
    pub final_text: String,
    pub usage: TokenUsage,
    /// Tool calls executed over the whole turn.
    pub tool_calls: usize,
    pub investigation_below_minimum: bool,
}

pub trait ContinuationDetector: Send + Sync {
    fn assess(&self, turn: &TurnDigest) -> Option<ResumeReason>;
}

/// Text-based detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicDetector;

impl ContinuationDetector for HeuristicDetector {
    fn assess(&self, turn: &TurnDigest) -> Option<ResumeReason> {
        let blank = turn.final_text.trim().is_empty();
        if blank && turn.tool_calls == 0 && turn.usage.total() == 0 {
            return Some(ResumeReason::EmptyTurn);
        }
        if blank && turn.tool_calls > 0 {
            return Some(ResumeReason::ToolOnly);
        }
        if turn.investigation_below_minimum {
            return Some(ResumeReason::InvestigationIncomplete);
        }
        if PROMISE.is_match(&turn.final_text) {
            return Some(ResumeReason::PromisedNextStep);
        }
        None
    }
}

/// Stable key for `reason` on the user message `last_user_text`.
pub fn resume_key(reason: ResumeReason, last_user_text: &str) -> String {
    let digest = Sha256::digest(last_user_text.trim().as_bytes());
    format!("{}:{}", reason.as_str(), &hex::encode(digest)[..16])
}

#[derive(Default)]
struct SchedulerState {
    turn: u64,
    claimed_turn: Option<u64>,
    recent: HashMap<String, Instant>,
    pending: Option<String>,
}

/// Enforces the one-per-turn cap and the debounce window.
pub struct ResumeScheduler {
    debounce: Duration,
    state: Mutex<SchedulerState>,
}

impl ResumeScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// A new user turn lifts the cap and drops anything still pending.
    pub fn begin_user_turn(&self) {
        let mut state = self.lock();
        state.turn += 1;
        state.pending = None;
    }

    /// Claims the continuation slot for `key`. Returns `false` when this
    /// turn already had one or the same key fired within the debounce.
    pub fn try_schedule(&self, key: &str) -> bool {
        let now = Instant::now();
        let debounce = self.debounce;
        let mut state = self.lock();
        if state.claimed_turn == Some(state.turn) {
            debug!(key, "auto-resume already used this turn");
            return false;
        }
        state.recent.retain(|_, at| now.duration_since(*at) < debounce);
        if state.recent.contains_key(key) {
            debug!(key, "auto-resume debounced");
            return false;
        }
        state.recent.insert(key.to_string(), now);
        state.claimed_turn = Some(state.turn);
        state.pending = Some(key.to_string());
        true
    }

    /// Takes the pending continuation if it is still `key`.
    pub fn take(&self, key: &str) -> bool {
        let mut state = self.lock();
        if state.pending.as_deref() == Some(key) {
            state.pending = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&self) {
        self.lock().pending = None;
    }

    pub fn pending(&self) -> Option<String> {
        self.lock().pending.clone()
    }
}
