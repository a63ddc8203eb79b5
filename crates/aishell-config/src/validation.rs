// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints that serde attributes cannot express: evidence
//! thresholds, budget ordering, timeouts and unique policy rows.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{AiShellConfig, BudgetConfig};

/// Validate a deserialized configuration.
///
/// Collects every violation instead of failing fast.
pub fn validate_config(config: &AiShellConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let inv = &config.investigation;
    if inv.query_floor == 0 {
        errors.push(ConfigError::invalid(
            "investigation.query_floor",
            "must be at least 1",
        ));
    }
    if inv.minimum_required_queries < inv.query_floor {
        errors.push(ConfigError::invalid(
            "investigation.minimum_required_queries",
            format!(
                "{} is below investigation.query_floor ({})",
                inv.minimum_required_queries, inv.query_floor
            ),
        ));
    }
    if inv.context_stack_limit == 0 {
        errors.push(ConfigError::invalid(
            "investigation.context_stack_limit",
            "must be at least 1",
        ));
    }

    check_budget("sanitizer.standard", &config.sanitizer.standard, &mut errors);
    check_budget(
        "sanitizer.anthropic_like",
        &config.sanitizer.anthropic_like,
        &mut errors,
    );
    if config.sanitizer.anthropic_like.max_total_json_chars
        > config.sanitizer.standard.max_total_json_chars
    {
        errors.push(ConfigError::invalid(
            "sanitizer.anthropic_like.max_total_json_chars",
            "must not exceed sanitizer.standard.max_total_json_chars",
        ));
    }

    let rl = &config.rate_limit;
    if rl.base_backoff_ms == 0 {
        errors.push(ConfigError::invalid(
            "rate_limit.base_backoff_ms",
            "must be greater than zero",
        ));
    }
    if rl.max_backoff_ms < rl.base_backoff_ms {
        errors.push(ConfigError::invalid(
            "rate_limit.max_backoff_ms",
            "must not be smaller than rate_limit.base_backoff_ms",
        ));
    }

    let mut seen = HashSet::new();
    for (i, policy) in config.policies.iter().enumerate() {
        if policy.provider.trim().is_empty() {
            errors.push(ConfigError::invalid(
                format!("policies[{i}].provider"),
                "must not be empty",
            ));
        } else if !seen.insert(policy.provider.as_str()) {
            errors.push(ConfigError::invalid(
                format!("policies[{i}].provider"),
                format!("duplicate policy row for provider `{}`", policy.provider),
            ));
        }
        if policy.system_prompt_cap == 0 {
            errors.push(ConfigError::invalid(
                format!("policies[{i}].system_prompt_cap"),
                "must be greater than zero",
            ));
        }
    }

    if !(100..=30_000).contains(&config.bridge.request_timeout_ms) {
        errors.push(ConfigError::invalid(
            "bridge.request_timeout_ms",
            format!(
                "must be between 100 and 30000, got {}",
                config.bridge.request_timeout_ms
            ),
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid(
            "storage.database_path",
            "must not be empty",
        ));
    }

    if config.tools.max_result_rows == 0 {
        errors.push(ConfigError::invalid(
            "tools.max_result_rows",
            "must be at least 1",
        ));
    }

    if config.credits.low_credits_threshold < 0.0 {
        errors.push(ConfigError::invalid(
            "credits.low_credits_threshold",
            "must be non-negative",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_budget(section: &str, budget: &BudgetConfig, errors: &mut Vec<ConfigError>) {
    for (key, value) in [
        ("max_message_chars", budget.max_message_chars),
        ("max_part_json_chars", budget.max_part_json_chars),
        ("max_total_json_chars", budget.max_total_json_chars),
    ] {
        if value == 0 {
            errors.push(ConfigError::invalid(
                format!("{section}.{key}"),
                "must be greater than zero",
            ));
        }
    }
}
