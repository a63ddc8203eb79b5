// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limit and retry governance for AI Shell.
//!
//! Classifies provider failures, tracks per-(provider, model) cooldowns and
//! request spacing, and holds the per-provider policy table.

pub mod backoff;
pub mod classify;
pub mod governor;
pub mod policy;

pub use backoff::{BackoffConfig, backoff_delay};
pub use classify::{ErrorClass, classify_error, is_rate_limit, parse_retry_hint};
pub use governor::{CooldownEntry, RateLimitGovernor};
pub use policy::{PolicyTable, ProviderPolicy};
