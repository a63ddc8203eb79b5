// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooldown behavior of the governor as seen by a caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aishell_core::{AiShellError, Notification, Notifier};
use aishell_resilience::{BackoffConfig, PolicyTable, RateLimitGovernor};

#[derive(Default)]
struct Sink(Mutex<Vec<Notification>>);

impl Notifier for Sink {
    fn notify(&self, n: Notification) {
        self.0.lock().unwrap().push(n);
    }
}

fn governor() -> (RateLimitGovernor, Arc<Sink>) {
    let sink = Arc::new(Sink::default());
    let backoff = BackoffConfig {
        base: Duration::from_millis(200),
        max: Duration::from_secs(5),
        jitter: Duration::from_millis(50),
        safety_margin: Duration::from_millis(250),
        max_wait: Duration::from_secs(30),
    };
    (
        RateLimitGovernor::new(Arc::new(PolicyTable::builtin()), backoff, sink.clone()),
        sink,
    )
}

#[tokio::test(start_paused = true)]
async fn retry_hint_sets_cooldown_with_margin() {
    let (gov, sink) = governor();
    let err = AiShellError::provider_status(
        429,
        "Rate limit reached for gpt-4.1. Please try again in 1500ms.",
    );

    let entry = gov.record_failure("openai", "gpt-4.1", &err);
    assert!(entry.wait >= Duration::from_millis(1_750), "{:?}", entry.wait);
    assert!(entry.retry);

    let delay = gov.should_delay("openai", "gpt-4.1");
    assert!(delay >= Duration::from_millis(1_750), "{delay:?}");

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert!(gov.should_delay("openai", "gpt-4.1") > Duration::ZERO);

    tokio::time::advance(Duration::from_secs(5)).await;
    // Only the openai spacing floor can remain, and no request was made.
    assert_eq!(gov.should_delay("openai", "gpt-4.1"), Duration::ZERO);

    assert_eq!(sink.0.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_never_moves_backwards_within_episode() {
    let (gov, _) = governor();
    let long = AiShellError::provider_status(429, "try again in 8s");
    let short = AiShellError::provider_status(429, "try again in 100ms");

    let first = gov.record_failure("openai", "gpt-4.1", &long);
    let mut previous = first.until;
    for _ in 0..5 {
        tokio::time::advance(Duration::from_millis(300)).await;
        let next = gov.record_failure("openai", "gpt-4.1", &short);
        assert!(next.until >= previous, "cooldown shrank");
        previous = next.until;
    }
}

#[tokio::test(start_paused = true)]
async fn anthropic_is_never_auto_retried() {
    let (gov, sink) = governor();
    let err = AiShellError::provider_status(429, "rate_limit_error: Number of request tokens has exceeded your per-minute rate limit");
    let entry = gov.record_failure("anthropic", "claude-sonnet-4", &err);
    assert!(!entry.retry);
    assert!(entry.class.is_rate_limited());
    assert!(gov.should_delay("anthropic", "claude-sonnet-4") > Duration::ZERO);
    assert_eq!(sink.0.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_acquires_are_serialized_by_slot() {
    let (gov, _) = governor();
    let gov = Arc::new(gov);
    let start = tokio::time::Instant::now();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let gov = gov.clone();
        handles.push(tokio::spawn(async move {
            gov.acquire("google", "gemini-2.5-pro").await.unwrap();
            tokio::time::Instant::now()
        }));
    }
    let mut finished = Vec::new();
    for h in handles {
        finished.push(h.await.unwrap() - start);
    }
    finished.sort();
    // google spacing is one second.
    assert!(finished[1] >= Duration::from_secs(1));
    assert!(finished[2] >= Duration::from_secs(2));
}
