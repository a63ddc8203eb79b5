// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for AI Shell.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level AI Shell configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AiShellConfig {
    /// Assistant identity and default model selection.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Outbound payload budgets.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Backoff and cooldown tuning.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-provider policy rows overriding the built-in table.
    #[serde(default)]
    pub policies: Vec<ProviderPolicyConfig>,

    /// Tool execution and permission settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Investigation workflow settings.
    #[serde(default)]
    pub investigation: InvestigationConfig,

    /// Session persistence and restore guard timings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Turn lifecycle settings (reviewer, auto-resume, substitutions).
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Host bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Credits gate settings.
    #[serde(default)]
    pub credits: CreditsConfig,
}

/// Assistant identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Inline system prompt string. Overridden by `system_prompt_file` if both set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Path to a markdown file containing the system prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,

    /// Provider used when a request does not name one.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when a request does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature forwarded to the provider.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
            system_prompt_file: None,
            default_provider: default_provider(),
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

fn default_agent_name() -> String {
    "aishell".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` requires environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default model to use for LLM requests.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Base URL, overridable for proxies and tests.
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            api_version: default_api_version(),
            base_url: default_anthropic_base_url(),
        }
    }
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

/// Character budgets for one provider class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Longest string content kept per message, in UTF-16 units.
    pub max_message_chars: usize,

    /// Largest serialized size of a single message.
    pub max_part_json_chars: usize,

    /// Largest serialized size of the whole outbound payload.
    pub max_total_json_chars: usize,
}

/// Outbound payload budgets for the sanitizer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizerConfig {
    /// Budgets for providers with ordinary token accounting.
    #[serde(default = "default_standard_budget")]
    pub standard: BudgetConfig,

    /// Tighter budgets for providers with strict per-minute token accounting.
    #[serde(default = "default_anthropic_budget")]
    pub anthropic_like: BudgetConfig,

    /// Body length kept when a tool message is rewritten as assistant text.
    #[serde(default = "default_tool_body_chars")]
    pub tool_body_chars: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_budget(),
            anthropic_like: default_anthropic_budget(),
            tool_body_chars: default_tool_body_chars(),
        }
    }
}

fn default_standard_budget() -> BudgetConfig {
    BudgetConfig {
        max_message_chars: 24_000,
        max_part_json_chars: 32_000,
        max_total_json_chars: 160_000,
    }
}

fn default_anthropic_budget() -> BudgetConfig {
    BudgetConfig {
        max_message_chars: 12_000,
        max_part_json_chars: 16_000,
        max_total_json_chars: 60_000,
    }
}

fn default_tool_body_chars() -> usize {
    2_000
}

/// Backoff and cooldown tuning for the rate-limit governor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// First backoff step in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound for the computed backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Maximum random jitter added to each backoff.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Added on top of provider retry hints.
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,

    /// Waits longer than this are refused instead of slept through.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
            safety_margin_ms: default_safety_margin_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_safety_margin_ms() -> u64 {
    250
}

fn default_max_wait_ms() -> u64 {
    20_000
}

/// A per-provider policy row.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderPolicyConfig {
    /// Provider id this row applies to (e.g. "anthropic", "openai").
    pub provider: String,

    /// Automatic retries after a rate-limit or transport error.
    pub max_retries: u32,

    /// Minimum spacing between requests to the same model.
    pub min_spacing_ms: u64,

    /// Character cap for the assembled system prompt.
    pub system_prompt_cap: usize,

    /// Whether heuristic auto-continuation may fire for this provider.
    pub auto_resume_allowed: bool,

    /// Use the tighter sanitizer budgets.
    #[serde(default)]
    pub anthropic_like: bool,

    /// Provider-specific minimum evidence; clamped to the investigation floor.
    #[serde(default)]
    pub minimum_required_queries: Option<u32>,
}

/// Tool execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Auto-approve query tools when the SQL is a read-only statement.
    #[serde(default)]
    pub allow_execution_of_read_only_queries: bool,

    /// Rows returned to the model per query result.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// Characters kept per result cell.
    #[serde(default = "default_max_cell_chars")]
    pub max_cell_chars: usize,

    /// Optional bound on how long a permission prompt may stay open.
    #[serde(default)]
    pub permission_timeout_secs: Option<u64>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allow_execution_of_read_only_queries: false,
            max_result_rows: default_max_result_rows(),
            max_cell_chars: default_max_cell_chars(),
            permission_timeout_secs: None,
        }
    }
}

fn default_max_result_rows() -> usize {
    100
}

fn default_max_cell_chars() -> usize {
    1_000
}

/// Investigation workflow configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InvestigationConfig {
    /// Diagnostic queries required before recommendations.
    #[serde(default = "default_minimum_required_queries")]
    pub minimum_required_queries: u32,

    /// Lowest value any provider override may reduce the minimum to.
    #[serde(default = "default_query_floor")]
    pub query_floor: u32,

    /// Numbered contexts kept in storage.
    #[serde(default = "default_context_stack_limit")]
    pub context_stack_limit: usize,

    /// Schema names whose objects need their columns fetched before querying.
    #[serde(default = "default_system_schemas")]
    pub system_schemas: Vec<String>,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            minimum_required_queries: default_minimum_required_queries(),
            query_floor: default_query_floor(),
            context_stack_limit: default_context_stack_limit(),
            system_schemas: default_system_schemas(),
        }
    }
}

fn default_minimum_required_queries() -> u32 {
    5
}

fn default_query_floor() -> u32 {
    3
}

fn default_context_stack_limit() -> usize {
    10
}

fn default_system_schemas() -> Vec<String> {
    vec!["sys".to_string(), "information_schema".to_string()]
}

/// Session persistence and restore guard timings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// How long after a restore external writes are checked against it.
    #[serde(default = "default_restore_guard_ms")]
    pub restore_guard_ms: u64,

    /// Guard suppression after an explicit clear.
    #[serde(default = "default_clear_cooldown_ms")]
    pub clear_cooldown_ms: u64,

    /// Coalescing window for routine session writes.
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,

    /// Sessions kept in history; oldest are dropped first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Serialized size above which a structured part is compacted on restore.
    #[serde(default = "default_part_size_ceiling")]
    pub part_size_ceiling: usize,

    /// Characters kept in a compacted part preview.
    #[serde(default = "default_part_preview_chars")]
    pub part_preview_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restore_guard_ms: default_restore_guard_ms(),
            clear_cooldown_ms: default_clear_cooldown_ms(),
            persist_debounce_ms: default_persist_debounce_ms(),
            max_sessions: default_max_sessions(),
            part_size_ceiling: default_part_size_ceiling(),
            part_preview_chars: default_part_preview_chars(),
        }
    }
}

fn default_restore_guard_ms() -> u64 {
    4_000
}

fn default_clear_cooldown_ms() -> u64 {
    1_500
}

fn default_persist_debounce_ms() -> u64 {
    2_000
}

fn default_max_sessions() -> usize {
    50
}

fn default_part_size_ceiling() -> usize {
    8_000
}

fn default_part_preview_chars() -> usize {
    1_500
}

/// A known-bad (provider, model) combination and its replacement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubstitutionRule {
    pub provider: String,

    /// Matches any model id starting with this prefix.
    pub model_prefix: String,

    pub replacement_model: String,

    /// Shown to the user when the substitution happens.
    pub reason: String,
}

/// Turn lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Run the reviewer pass before the main request.
    #[serde(default)]
    pub reviewer_enabled: bool,

    /// Model for the reviewer pass; defaults to the request model.
    #[serde(default)]
    pub reviewer_model: Option<String>,

    /// Allow one automatic continuation per user turn.
    #[serde(default = "default_true")]
    pub auto_resume_enabled: bool,

    /// Delay before an auto-continuation fires.
    #[serde(default = "default_auto_resume_debounce_ms")]
    pub auto_resume_debounce_ms: u64,

    /// Model round-trips allowed per user turn.
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: usize,

    #[serde(default = "default_substitutions")]
    pub substitutions: Vec<SubstitutionRule>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reviewer_enabled: false,
            reviewer_model: None,
            auto_resume_enabled: true,
            auto_resume_debounce_ms: default_auto_resume_debounce_ms(),
            max_tool_steps: default_max_tool_steps(),
            substitutions: default_substitutions(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_auto_resume_debounce_ms() -> u64 {
    1_200
}

fn default_max_tool_steps() -> usize {
    12
}

fn default_substitutions() -> Vec<SubstitutionRule> {
    vec![SubstitutionRule {
        provider: "google".to_string(),
        model_prefix: "gemini-3".to_string(),
        replacement_model: "gemini-2.5-flash".to_string(),
        reason: "tool calls on this model require thought signatures".to_string(),
    }]
}

/// Host bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Timeout for every host request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Key file for encrypted values; created on first use.
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            key_path: default_key_path(),
        }
    }
}

fn data_file(name: &str) -> String {
    dirs::data_dir()
        .map(|p| p.join("aishell").join(name))
        .unwrap_or_else(|| std::path::PathBuf::from(name))
        .to_string_lossy()
        .into_owned()
}

fn default_database_path() -> String {
    data_file("aishell.db")
}

fn default_key_path() -> String {
    data_file("storage.key")
}

/// Credits gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreditsConfig {
    /// Remaining credits at or below which a low-credits warning is shown.
    #[serde(default = "default_low_credits_threshold")]
    pub low_credits_threshold: f64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            low_credits_threshold: default_low_credits_threshold(),
        }
    }
}

fn default_low_credits_threshold() -> f64 {
    5.0
}
