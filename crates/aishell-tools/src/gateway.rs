// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool invocation gateway.
//!
//! Per call: `Requested -> (AutoApproved | AwaitingPermission) ->
//! (Accepted | Rejected) -> (Executed | Failed | Declined)`. Failures never
//! escape as errors; they come back as [`ToolResult`] variants the model can
//! react to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use aishell_config::model::ToolsConfig;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::permission::{PermissionBroker, PermissionDecision};
use crate::result::ToolResult;
use crate::sql::is_read_only_query;
use crate::tool::{Tool, ToolCall, ToolRegistry};

const LOGGED_ARGS_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Requested,
    AutoApproved,
    AwaitingPermission,
    Accepted,
    Rejected,
    Executed,
    Failed,
    Declined,
}

impl ToolCallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Declined)
    }
}

fn truncate_for_log(args: &Value) -> String {
    let text = args.to_string();
    if text.chars().count() <= LOGGED_ARGS_CHARS {
        return text;
    }
    let head: String = text.chars().take(LOGGED_ARGS_CHARS).collect();
    format!("{head}…")
}

/// Inspects a call before approval is sought. Returning a result ends the
/// call without asking the user or running the tool.
pub trait CallGuard: Send + Sync {
    fn check(&self, tool: &dyn Tool, args: &Value) -> Option<ToolResult>;
}

pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    broker: Arc<PermissionBroker>,
    allow_read_only_queries: AtomicBool,
    guards: Vec<Arc<dyn CallGuard>>,
    calls: Mutex<HashMap<String, ToolCallState>>,
}

impl ToolGateway {
    pub fn new(
        registry: Arc<ToolRegistry>,
        broker: Arc<PermissionBroker>,
        config: &ToolsConfig,
    ) -> Self {
        Self {
            registry,
            broker,
            allow_read_only_queries: AtomicBool::new(config.allow_execution_of_read_only_queries),
            guards: Vec::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn CallGuard>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<PermissionBroker> {
        &self.broker
    }

    /// Toggles auto-approval of statically read-only SQL.
    pub fn set_allow_read_only_queries(&self, allow: bool) {
        self.allow_read_only_queries.store(allow, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ToolCallState>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, id: &str, state: ToolCallState) {
        debug!(tool_call_id = id, ?state, "tool call state");
        self.lock().insert(id.to_string(), state);
    }

    /// Last recorded state of a call.
    pub fn state(&self, tool_call_id: &str) -> Option<ToolCallState> {
        self.lock().get(tool_call_id).copied()
    }

    /// Forgets finished calls, typically at the start of a turn.
    pub fn clear_finished(&self) {
        self.lock().retain(|_, state| !state.is_terminal());
    }

    fn auto_approves(&self, tool: &dyn Tool, args: &Value) -> bool {
        if tool.access().always_auto_approved() {
            return true;
        }
        self.allow_read_only_queries.load(Ordering::SeqCst)
            && tool
                .sql_argument(args)
                .is_some_and(|sql| is_read_only_query(&sql))
    }

    /// Runs one tool call through approval and execution.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "model requested an unknown tool");
            return ToolResult::error(format!(
                "Unknown tool '{}'. Available tools: {}",
                call.name,
                self.registry.names().join(", ")
            ));
        };

        {
            let mut calls = self.lock();
            if calls.get(&call.id).is_some_and(|s| !s.is_terminal()) {
                warn!(tool_call_id = %call.id, "duplicate tool call rejected while in flight");
                return ToolResult::error(format!(
                    "Tool call {} is already executing",
                    call.id
                ));
            }
            calls.insert(call.id.clone(), ToolCallState::Requested);
        }
        info!(
            tool = %call.name,
            tool_call_id = %call.id,
            args = %truncate_for_log(&call.args),
            "tool call requested"
        );

        if let Some(blocked) = self
            .guards
            .iter()
            .find_map(|guard| guard.check(tool.as_ref(), &call.args))
        {
            info!(tool = %call.name, tool_call_id = %call.id, "tool call blocked before approval");
            self.set_state(&call.id, ToolCallState::Failed);
            return blocked;
        }

        if self.auto_approves(tool.as_ref(), &call.args) {
            self.set_state(&call.id, ToolCallState::AutoApproved);
        } else {
            self.set_state(&call.id, ToolCallState::AwaitingPermission);
            match self.broker.request(&call.id, &call.name).await {
                PermissionDecision::Accepted => self.set_state(&call.id, ToolCallState::Accepted),
                PermissionDecision::Rejected => {
                    self.set_state(&call.id, ToolCallState::Rejected);
                    info!(tool = %call.name, tool_call_id = %call.id, "tool call declined");
                    self.set_state(&call.id, ToolCallState::Declined);
                    return ToolResult::declined(&call.name);
                }
            }
        }

        match tool.invoke(call.args.clone()).await {
            Ok(result) => {
                self.set_state(&call.id, ToolCallState::Executed);
                result
            }
            Err(e) => {
                warn!(tool = %call.name, tool_call_id = %call.id, error = %e, "tool failed");
                self.set_state(&call.id, ToolCallState::Failed);
                ToolResult::error(e.to_string())
            }
        }
    }
}
