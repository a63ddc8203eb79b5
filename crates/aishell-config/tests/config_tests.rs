// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the AI Shell configuration system.

use aishell_config::diagnostic::ConfigError;
use aishell_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "dba-helper"
log_level = "debug"
default_provider = "openai"
default_model = "gpt-4.1"
temperature = 0.2

[anthropic]
api_key = "sk-ant-123"

[sanitizer]
tool_body_chars = 500

[sanitizer.anthropic_like]
max_message_chars = 4000
max_part_json_chars = 6000
max_total_json_chars = 30000

[rate_limit]
max_wait_ms = 5000

[[policies]]
provider = "openai"
max_retries = 3
min_spacing_ms = 250
system_prompt_cap = 20000
auto_resume_allowed = true

[tools]
allow_execution_of_read_only_queries = true
max_result_rows = 25

[investigation]
minimum_required_queries = 4

[session]
restore_guard_ms = 2500

[orchestrator]
reviewer_enabled = true
substitutions = []

[bridge]
request_timeout_ms = 2000

[storage]
database_path = "/tmp/aishell-test.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "dba-helper");
    assert_eq!(config.agent.default_provider, "openai");
    assert_eq!(config.agent.temperature, Some(0.2));
    assert_eq!(config.anthropic.api_key.as_deref(), Some("sk-ant-123"));
    assert_eq!(config.sanitizer.tool_body_chars, 500);
    assert_eq!(config.sanitizer.anthropic_like.max_total_json_chars, 30_000);
    // Untouched sections keep their defaults.
    assert_eq!(config.sanitizer.standard.max_total_json_chars, 160_000);
    assert_eq!(config.rate_limit.max_wait_ms, 5_000);
    assert_eq!(config.rate_limit.base_backoff_ms, 1_000);
    assert_eq!(config.policies.len(), 1);
    assert_eq!(config.policies[0].max_retries, 3);
    assert!(!config.policies[0].anthropic_like);
    assert!(config.tools.allow_execution_of_read_only_queries);
    assert_eq!(config.tools.max_result_rows, 25);
    assert_eq!(config.investigation.minimum_required_queries, 4);
    assert_eq!(config.investigation.query_floor, 3);
    assert_eq!(config.session.restore_guard_ms, 2_500);
    assert!(config.orchestrator.reviewer_enabled);
    assert!(config.orchestrator.substitutions.is_empty());
    assert_eq!(config.bridge.request_timeout_ms, 2_000);
    assert!(!config.storage.wal_mode);
}

#[test]
fn defaults_apply_to_empty_input() {
    let config = load_and_validate_str("").expect("empty config is valid");
    assert_eq!(config.agent.default_provider, "anthropic");
    assert_eq!(config.investigation.minimum_required_queries, 5);
    assert_eq!(config.investigation.context_stack_limit, 10);
    assert_eq!(config.bridge.request_timeout_ms, 3_000);
    assert_eq!(config.orchestrator.substitutions.len(), 1);
    assert!(!config.tools.allow_execution_of_read_only_queries);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[session]
restore_gaurd_ms = 100
"#;
    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    let found = errors.iter().any(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => key == "restore_gaurd_ms" && suggestion.as_deref() == Some("restore_guard_ms"),
        _ => false,
    });
    assert!(found, "expected UnknownKey with suggestion, got {errors:?}");
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[tools]
max_result_rows = "lots"
"#;
    let errors = load_and_validate_str(toml).expect_err("type mismatch");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("max_result_rows"))),
        "got {errors:?}"
    );
}

#[test]
fn policy_row_missing_field_is_reported() {
    let toml = r#"
[[policies]]
provider = "openai"
max_retries = 1
"#;
    let errors = load_and_validate_str(toml).expect_err("incomplete policy row");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::MissingKey { .. })),
        "got {errors:?}"
    );
}

#[test]
fn semantic_violation_is_reported_after_parse() {
    let toml = r#"
[investigation]
minimum_required_queries = 1
"#;
    let errors = load_and_validate_str(toml).expect_err("below floor");
    assert!(errors.iter().any(|e| matches!(e, ConfigError::Validation { .. })));
}

#[test]
#[serial_test::serial]
fn file_values_load_from_path() {
    let dir = std::env::temp_dir().join(format!("aishell-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("aishell.toml");
    std::fs::write(&path, "[credits]\nlow_credits_threshold = 2.5\n").unwrap();

    let config = load_and_validate_path(&path).expect("valid file");
    assert_eq!(config.credits.low_credits_threshold, 2.5);

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_dir(&dir);
}
