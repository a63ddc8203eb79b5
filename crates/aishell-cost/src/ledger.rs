// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage ledger: one row per completed or failed turn.

use aishell_core::types::UsageRecord;
use aishell_core::{AiShellError, UsageLogger};
use aishell_storage::{Database, map_tr_err};
use async_trait::async_trait;
use rusqlite::params;
use serde::Serialize;
use tracing::info;

/// Aggregated counts over a slice of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    pub requests: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// SQLite-backed [`UsageLogger`] over the `usage_ledger` table.
#[derive(Clone)]
pub struct UsageLedger {
    db: Database,
}

impl UsageLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Totals since an ISO-8601 timestamp (inclusive), optionally for one session.
    pub async fn totals(
        &self,
        since: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<UsageTotals, AiShellError> {
        let since = since.unwrap_or("").to_string();
        let session_id = session_id.map(str::to_string);
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0),
                            COALESCE(SUM(input_tokens), 0),
                            COALESCE(SUM(output_tokens), 0),
                            COALESCE(SUM(duration_ms), 0)
                     FROM usage_ledger
                     WHERE created_at >= ?1 AND (?2 IS NULL OR session_id = ?2)",
                    params![since, session_id],
                    |row| {
                        Ok(UsageTotals {
                            requests: row.get::<_, i64>(0)? as u64,
                            failures: row.get::<_, i64>(1)? as u64,
                            input_tokens: row.get::<_, i64>(2)? as u64,
                            output_tokens: row.get::<_, i64>(3)? as u64,
                            duration_ms: row.get::<_, i64>(4)? as u64,
                        })
                    },
                )
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl UsageLogger for UsageLedger {
    async fn log_usage(&self, record: UsageRecord) -> Result<(), AiShellError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let row = record.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO usage_ledger (id, session_id, provider, model, input_tokens,
                         output_tokens, duration_ms, success, error, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        id,
                        row.session_id,
                        row.provider,
                        row.model,
                        row.input_tokens,
                        row.output_tokens,
                        row.duration_ms as i64,
                        row.success,
                        row.error,
                        created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(
            provider = %record.provider,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            duration_ms = record.duration_ms,
            success = record.success,
            "usage recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(success: bool, input: u32, output: u32, session: &str) -> UsageRecord {
        UsageRecord {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            input_tokens: input,
            output_tokens: output,
            duration_ms: 120,
            success,
            error: (!success).then(|| "rate limited".to_string()),
            session_id: Some(session.into()),
        }
    }

    #[tokio::test]
    async fn failures_are_counted_with_zero_tokens() {
        let ledger = UsageLedger::new(Database::open_in_memory().await.unwrap());
        ledger.log_usage(record(true, 100, 40, "s1")).await.unwrap();
        ledger.log_usage(record(false, 0, 0, "s1")).await.unwrap();
        ledger.log_usage(record(true, 10, 5, "s2")).await.unwrap();

        let all = ledger.totals(None, None).await.unwrap();
        assert_eq!(all.requests, 3);
        assert_eq!(all.failures, 1);
        assert_eq!(all.input_tokens, 110);
        assert_eq!(all.output_tokens, 45);
        assert_eq!(all.duration_ms, 360);

        let s1 = ledger.totals(None, Some("s1")).await.unwrap();
        assert_eq!(s1.requests, 2);
        assert_eq!(s1.input_tokens, 100);
    }

    #[tokio::test]
    async fn since_filters_older_rows() {
        let ledger = UsageLedger::new(Database::open_in_memory().await.unwrap());
        ledger.log_usage(record(true, 1, 1, "s")).await.unwrap();
        let future = ledger.totals(Some("2999-01-01T00:00:00.000Z"), None).await.unwrap();
        assert_eq!(future, UsageTotals::default());
    }
}
