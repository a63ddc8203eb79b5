// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool invocation for AI Shell.
//!
//! Tools are registered by name, classified by what they may touch, and
//! executed through the [`ToolGateway`], which auto-approves safe calls and
//! parks the rest in the [`PermissionBroker`] until a human decides.

pub mod builtin;
pub mod gateway;
pub mod permission;
pub mod redact;
pub mod result;
pub mod sql;
pub mod tool;

pub use builtin::register_builtin_tools;
pub use gateway::{CallGuard, ToolCallState, ToolGateway};
pub use permission::{PermissionBroker, PermissionDecision, PendingToolCall};
pub use redact::{RedactedResult, redact_query_result};
pub use result::ToolResult;
pub use sql::{is_read_only_query, syntax_problems};
pub use tool::{Tool, ToolAccess, ToolCall, ToolRegistry, parse_args};
