// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in tools over the host bridge and the query executor.

pub mod host;
pub mod query;

use std::sync::Arc;

use aishell_config::model::ToolsConfig;
use aishell_core::{HostBridge, QueryExecutor};

pub use host::{HostOp, HostTool, register_host_tools};
pub use query::{RunQueryTool, ValidateQueryTool};

use crate::tool::ToolRegistry;

/// Registers host tools plus `validate_query` and `run_query`.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    host: Arc<dyn HostBridge>,
    executor: Arc<dyn QueryExecutor>,
    config: &ToolsConfig,
) {
    register_host_tools(registry, host);
    registry.register(Arc::new(ValidateQueryTool));
    registry.register(Arc::new(RunQueryTool::new(executor, config.clone())));
}
