// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(provider, model) throttling and cooldown tracking.
//!
//! Two independent mechanisms gate every request:
//! - a static minimum spacing between requests to the same model, and
//! - an error-driven cooldown that only ever moves forward in time.
//!
//! [`RateLimitGovernor::acquire`] reserves the next free slot under a lock
//! and then sleeps outside it, so concurrent callers for the same model are
//! ordered by their reserved slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aishell_core::{AiShellError, Notification, NotificationKind, Notifier};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::backoff::{BackoffConfig, backoff_delay, combine_with_hint};
use crate::classify::{ErrorClass, classify_error, parse_retry_hint};
use crate::policy::PolicyTable;

/// Result of recording a failure for one (provider, model) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownEntry {
    /// `provider:model`.
    pub key: String,
    /// Requests are withheld until this instant.
    pub until: Instant,
    /// Wait computed for this failure (backoff or hint, plus margin).
    pub wait: Duration,
    /// 1-based failure count in the current episode.
    pub attempt: u32,
    pub class: ErrorClass,
    /// Whether the caller may retry automatically.
    pub retry: bool,
}

#[derive(Debug, Default)]
struct ModelState {
    cooldown_until: Option<Instant>,
    /// Start of the most recently reserved request slot.
    last_slot: Option<Instant>,
    /// Failures since the last success.
    episode_failures: u32,
}

/// Rate-limit and retry governor shared by every conversation.
pub struct RateLimitGovernor {
    policies: Arc<PolicyTable>,
    backoff: BackoffConfig,
    state: Mutex<HashMap<String, ModelState>>,
    notifier: Arc<dyn Notifier>,
}

fn key(provider: &str, model: &str) -> String {
    format!("{provider}:{model}")
}

impl RateLimitGovernor {
    pub fn new(
        policies: Arc<PolicyTable>,
        backoff: BackoffConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            policies,
            backoff,
            state: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ModelState>> {
        // A poisoned map only means a panic mid-update of plain timestamps.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// How long a request to `(provider, model)` issued now would have to wait.
    pub fn should_delay(&self, provider: &str, model: &str) -> Duration {
        let now = Instant::now();
        let spacing = self.policies.policy(provider).min_spacing;
        let state = self.lock();
        match state.get(&key(provider, model)) {
            Some(s) => earliest_start(s, spacing, now).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Waits for the next free slot for `(provider, model)`.
    ///
    /// Refuses with [`AiShellError::RateLimited`] instead of waiting when the
    /// slot is further away than the configured maximum wait.
    pub async fn acquire(&self, provider: &str, model: &str) -> Result<(), AiShellError> {
        let k = key(provider, model);
        let spacing = self.policies.policy(provider).min_spacing;
        let start = {
            let now = Instant::now();
            let mut state = self.lock();
            let entry = state.entry(k.clone()).or_default();
            let start = earliest_start(entry, spacing, now);
            let wait = start.saturating_duration_since(now);
            if wait > self.backoff.max_wait {
                warn!(key = %k, wait_ms = wait.as_millis() as u64, "request refused, cooldown too long");
                return Err(AiShellError::RateLimited {
                    wait,
                    message: format!(
                        "{provider} ({model}) is cooling down; try again in {:.1}s",
                        wait.as_secs_f64()
                    ),
                });
            }
            entry.last_slot = Some(start);
            start
        };

        if start > Instant::now() {
            debug!(key = %k, wait_ms = start.saturating_duration_since(Instant::now()).as_millis() as u64, "waiting for request slot");
            tokio::time::sleep_until(start).await;
        }
        Ok(())
    }

    /// Records a failed request and decides whether to retry.
    ///
    /// The cooldown for the pair is extended to at least `now + wait` and is
    /// never shortened by this call.
    pub fn record_failure(&self, provider: &str, model: &str, err: &AiShellError) -> CooldownEntry {
        let k = key(provider, model);
        let policy = self.policies.policy(provider);
        let class = classify_error(err);
        let message = err.to_string();
        let now = Instant::now();

        let entry = {
            let mut state = self.lock();
            let s = state.entry(k.clone()).or_default();
            s.episode_failures += 1;
            let attempt = s.episode_failures;

            let wait = match class {
                ErrorClass::Fatal => Duration::ZERO,
                _ => combine_with_hint(
                    backoff_delay(attempt - 1, &self.backoff),
                    parse_retry_hint(&message),
                    &self.backoff,
                ),
            };

            let until = if class.is_rate_limited() {
                let candidate = now + wait;
                let extended = s.cooldown_until.map_or(candidate, |u| u.max(candidate));
                s.cooldown_until = Some(extended);
                extended
            } else {
                now + wait
            };

            let retry = match class {
                ErrorClass::Fatal => false,
                ErrorClass::RateLimited {
                    retried_internally: true,
                } => false,
                _ => attempt <= policy.max_retries && wait <= self.backoff.max_wait,
            };

            CooldownEntry {
                key: k,
                until,
                wait: until.saturating_duration_since(now),
                attempt,
                class,
                retry,
            }
        };

        if entry.class.is_rate_limited() {
            self.announce(provider, model, &entry);
        } else if !entry.retry {
            error!(key = %entry.key, attempt = entry.attempt, error = %message, "request failed, not retrying");
        } else {
            warn!(key = %entry.key, attempt = entry.attempt, wait_ms = entry.wait.as_millis() as u64, error = %message, "request failed, retrying");
        }
        entry
    }

    /// Ends the failure episode for the pair.
    pub fn record_success(&self, provider: &str, model: &str) {
        let mut state = self.lock();
        if let Some(s) = state.get_mut(&key(provider, model)) {
            s.episode_failures = 0;
        }
    }

    fn announce(&self, provider: &str, model: &str, entry: &CooldownEntry) {
        let secs = entry.wait.as_secs_f64();
        let message = if entry.retry {
            format!("{provider} rate limit hit for {model}. Retrying in {secs:.1}s.")
        } else {
            format!("{provider} rate limit hit for {model}. Please wait {secs:.1}s before trying again.")
        };
        warn!(key = %entry.key, attempt = entry.attempt, wait_ms = entry.wait.as_millis() as u64, retry = entry.retry, "rate limited");
        self.notifier.notify(
            Notification::new(NotificationKind::RateLimit, message).with_payload(serde_json::json!({
                "provider": provider,
                "model": model,
                "waitMs": entry.wait.as_millis() as u64,
                "retrying": entry.retry,
            })),
        );
    }
}

/// Earliest instant a new request may start given spacing and cooldown.
fn earliest_start(state: &ModelState, spacing: Duration, now: Instant) -> Instant {
    let mut start = now;
    if let Some(last) = state.last_slot {
        start = start.max(last + spacing);
    }
    if let Some(until) = state.cooldown_until {
        start = start.max(until);
    }
    start
}
