// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-provider policy table.
//!
//! Everything that differs between providers lives in one row, so adding a
//! provider means adding a row rather than new branches in the orchestrator.

use std::collections::HashMap;
use std::time::Duration;

use aishell_config::model::ProviderPolicyConfig;

/// Behavioral knobs for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    /// Automatic retries after a retryable failure; zero disables them.
    pub max_retries: u32,
    /// Static floor between two requests to the same model.
    pub min_spacing: Duration,
    /// Character cap for the assembled system prompt.
    pub system_prompt_cap: usize,
    pub auto_resume_allowed: bool,
    /// Strict per-minute token accounting; selects tighter budgets.
    pub anthropic_like: bool,
    /// Lowered evidence threshold, if any.
    pub minimum_required_queries: Option<u32>,
}

impl ProviderPolicy {
    fn from_config(row: &ProviderPolicyConfig) -> Self {
        Self {
            max_retries: row.max_retries,
            min_spacing: Duration::from_millis(row.min_spacing_ms),
            system_prompt_cap: row.system_prompt_cap,
            auto_resume_allowed: row.auto_resume_allowed,
            anthropic_like: row.anthropic_like,
            minimum_required_queries: row.minimum_required_queries,
        }
    }
}

/// Lookup table keyed by provider id, with a fallback row.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rows: HashMap<String, ProviderPolicy>,
    fallback: ProviderPolicy,
}

impl PolicyTable {
    /// Built-in rows for the providers AI Shell knows about.
    pub fn builtin() -> Self {
        let mut rows = HashMap::new();
        rows.insert(
            "anthropic".to_string(),
            ProviderPolicy {
                max_retries: 0,
                min_spacing: Duration::from_millis(2_500),
                system_prompt_cap: 12_000,
                auto_resume_allowed: false,
                anthropic_like: true,
                minimum_required_queries: Some(3),
            },
        );
        rows.insert(
            "openai".to_string(),
            ProviderPolicy {
                max_retries: 2,
                min_spacing: Duration::from_millis(400),
                system_prompt_cap: 24_000,
                auto_resume_allowed: true,
                anthropic_like: false,
                minimum_required_queries: None,
            },
        );
        rows.insert(
            "google".to_string(),
            ProviderPolicy {
                max_retries: 2,
                min_spacing: Duration::from_millis(1_000),
                system_prompt_cap: 24_000,
                auto_resume_allowed: true,
                anthropic_like: false,
                minimum_required_queries: None,
            },
        );
        rows.insert(
            "openai-compatible".to_string(),
            ProviderPolicy {
                max_retries: 1,
                min_spacing: Duration::from_millis(750),
                system_prompt_cap: 16_000,
                auto_resume_allowed: true,
                anthropic_like: false,
                minimum_required_queries: None,
            },
        );
        Self {
            rows,
            fallback: ProviderPolicy {
                max_retries: 1,
                min_spacing: Duration::from_millis(1_000),
                system_prompt_cap: 16_000,
                auto_resume_allowed: true,
                anthropic_like: false,
                minimum_required_queries: None,
            },
        }
    }

    /// Built-in rows with configured rows layered on top.
    pub fn from_config(rows: &[ProviderPolicyConfig]) -> Self {
        rows.iter().fold(Self::builtin(), |table, row| {
            table.with_row(&row.provider, ProviderPolicy::from_config(row))
        })
    }

    pub fn with_row(mut self, provider: &str, policy: ProviderPolicy) -> Self {
        self.rows.insert(provider.to_ascii_lowercase(), policy);
        self
    }

    /// Policy for `provider`, or the fallback row.
    pub fn policy(&self, provider: &str) -> &ProviderPolicy {
        self.rows
            .get(&provider.to_ascii_lowercase())
            .unwrap_or(&self.fallback)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_row_is_strict() {
        let table = PolicyTable::builtin();
        let p = table.policy("Anthropic");
        assert_eq!(p.max_retries, 0);
        assert!(!p.auto_resume_allowed);
        assert!(p.anthropic_like);
    }

    #[test]
    fn unknown_provider_uses_fallback() {
        let table = PolicyTable::builtin();
        assert_eq!(table.policy("mistral").max_retries, 1);
    }

    #[test]
    fn configured_rows_override_builtin() {
        let table = PolicyTable::from_config(&[ProviderPolicyConfig {
            provider: "openai".into(),
            max_retries: 5,
            min_spacing_ms: 10,
            system_prompt_cap: 1_000,
            auto_resume_allowed: false,
            anthropic_like: true,
            minimum_required_queries: Some(1),
        }]);
        let p = table.policy("openai");
        assert_eq!(p.max_retries, 5);
        assert_eq!(p.min_spacing, Duration::from_millis(10));
        assert!(p.anthropic_like);
        assert_eq!(p.minimum_required_queries, Some(1));
    }

    #[test]
    fn only_anthropic_overrides_the_evidence_threshold() {
        let table = PolicyTable::builtin();
        assert_eq!(table.policy("openai").minimum_required_queries, None);
        assert_eq!(table.policy("anthropic").minimum_required_queries, Some(3));
        assert_eq!(table.policy("unknown").minimum_required_queries, None);
    }
}
