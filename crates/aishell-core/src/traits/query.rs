// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query execution collaborator.

use async_trait::async_trait;

use crate::error::AiShellError;
use crate::types::{ObjectSchema, QueryResult};

/// Opaque database access. The core only inspects row/field shape.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run_query(&self, sql: &str) -> Result<QueryResult, AiShellError>;

    /// Lists the columns of a table, view or catalog object.
    async fn fetch_schema(&self, object: &str) -> Result<ObjectSchema, AiShellError>;
}
