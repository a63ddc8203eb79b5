// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of heterogeneous provider errors.
//!
//! Providers report rate limiting through status codes, error type names
//! and free-text messages. This module reduces all of them to an
//! [`ErrorClass`] plus an optional machine-readable wait hint.

use std::sync::LazyLock;
use std::time::Duration;

use aishell_core::AiShellError;
use regex::Regex;

/// Rate-limit vocabulary found in provider error messages.
static RATE_LIMIT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(rate[ _-]?limit|too many requests|quota|resource[ _]exhausted|overloaded|\btpm\b|\brpm\b|tokens per min|requests per min)",
    )
    .unwrap()
});

/// "failed after 3 attempts", "after 2 retries", "maxRetries exceeded".
static RETRIED_INTERNALLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:failed after|after)\s+(\d+)\s+(?:attempts|retries|tries)|max[ _]?retries\s+exceeded")
        .unwrap()
});

/// "try again in 1500ms", "retry after 2.5s", "Please retry in 20 seconds".
static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:try again|retry)\s+(?:in|after)\s+(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)\b",
    )
    .unwrap()
});

/// `retry-after: 3`, `"retryDelay": "20s"`, `retry_after_ms=800`.
static RETRY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)retry[-_ ]?(?:after|delay)(_ms|-ms)?"?\s*[:=]\s*"?(\d+(?:\.\d+)?)\s*(ms|s)?"#,
    )
    .unwrap()
});

/// How the governor should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 429-like. `retried_internally` means the provider SDK already spent
    /// its own retries, so only a cooldown is set.
    RateLimited { retried_internally: bool },
    /// Network failures, 5xx and malformed streams.
    Transient,
    /// Anything a retry cannot fix (auth, bad request, cancellation).
    Fatal,
}

impl ErrorClass {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// True when a status or message indicates rate limiting.
pub fn is_rate_limit(status: Option<u16>, message: &str) -> bool {
    status == Some(429) || RATE_LIMIT_WORDS.is_match(message)
}

/// Attempt count when the message says the provider already retried.
pub fn retried_attempts(message: &str) -> Option<u32> {
    let caps = RETRIED_INTERNALLY.captures(message)?;
    Some(caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(1))
}

/// Parses a retry hint out of free text. Returns the largest hint found.
pub fn parse_retry_hint(message: &str) -> Option<Duration> {
    let phrase = RETRY_IN.captures_iter(message).filter_map(|caps| {
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str().to_ascii_lowercase();
        Some(to_duration(value, unit.starts_with("ms") || unit.starts_with("milli")))
    });
    let field = RETRY_FIELD.captures_iter(message).filter_map(|caps| {
        let value: f64 = caps.get(2)?.as_str().parse().ok()?;
        let millis = caps.get(1).is_some()
            || caps
                .get(3)
                .is_some_and(|u| u.as_str().eq_ignore_ascii_case("ms"));
        Some(to_duration(value, millis))
    });
    phrase
        .chain(field)
        .filter(|d| !d.is_zero())
        .max()
}

fn to_duration(value: f64, millis: bool) -> Duration {
    let secs = if millis { value / 1000.0 } else { value };
    Duration::from_secs_f64(secs.clamp(0.0, 3_600.0))
}

/// Reduces an error to its class.
pub fn classify_error(err: &AiShellError) -> ErrorClass {
    match err {
        AiShellError::RateLimited { .. } => ErrorClass::RateLimited {
            retried_internally: false,
        },
        AiShellError::Provider {
            message, status, ..
        } => classify_message(*status, message),
        AiShellError::Timeout { .. } | AiShellError::Bridge { .. } => ErrorClass::Transient,
        AiShellError::Internal(message) => classify_message(None, message),
        _ => ErrorClass::Fatal,
    }
}

fn classify_message(status: Option<u16>, message: &str) -> ErrorClass {
    if is_rate_limit(status, message) {
        return ErrorClass::RateLimited {
            retried_internally: retried_attempts(message).is_some(),
        };
    }
    if retried_attempts(message).is_some() {
        // The SDK gave up on something that was not a rate limit; retrying
        // again would just repeat its work.
        return ErrorClass::Fatal;
    }
    match status {
        Some(408 | 409 | 500..=599) | None => ErrorClass::Transient,
        Some(_) => ErrorClass::Fatal,
    }
}
