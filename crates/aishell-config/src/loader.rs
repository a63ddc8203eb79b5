// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./aishell.toml` > `~/.config/aishell/aishell.toml` > `/etc/aishell/aishell.toml`
//! with environment variable overrides via `AISHELL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::AiShellConfig;

/// Sections that can be targeted by `AISHELL_<SECTION>_<KEY>` variables.
const ENV_SECTIONS: &[&str] = &[
    "agent",
    "anthropic",
    "rate_limit",
    "tools",
    "investigation",
    "session",
    "orchestrator",
    "bridge",
    "storage",
    "credits",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/aishell/aishell.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "aishell.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("aishell/aishell.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/aishell/aishell.toml` (system-wide)
/// 3. `~/.config/aishell/aishell.toml` (user XDG config)
/// 4. `./aishell.toml` (local directory)
/// 5. `AISHELL_*` environment variables
pub fn load_config() -> Result<AiShellConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<AiShellConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AiShellConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AiShellConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AiShellConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(AiShellConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-containing
/// keys survive: `AISHELL_RATE_LIMIT_MAX_WAIT_MS` maps to
/// `rate_limit.max_wait_ms`, not `rate.limit.max.wait.ms`.
fn env_provider() -> Env {
    Env::prefixed("AISHELL_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env key onto a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
