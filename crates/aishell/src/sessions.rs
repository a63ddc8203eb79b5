// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `aishell sessions` command implementation.

use std::sync::Arc;

use aishell_config::model::AiShellConfig;
use aishell_core::{AiShellError, Role, SessionId, StorageAdapter};
use aishell_cost::UsageLedger;
use aishell_storage::{ChatSession, ChatSessionStore, SqliteStore};
use colored::Colorize;

use crate::SessionCommands;

/// Opens the session store over the configured database.
pub async fn open_store(
    config: &AiShellConfig,
) -> Result<(Arc<SqliteStore>, ChatSessionStore), AiShellError> {
    let storage = Arc::new(SqliteStore::new(config.storage.clone()));
    storage.initialize().await?;
    let sessions = ChatSessionStore::new(storage.clone(), &config.session);
    Ok((storage, sessions))
}

pub async fn run_sessions(config: &AiShellConfig, action: SessionCommands) -> Result<(), AiShellError> {
    let (storage, sessions) = open_store(config).await?;
    match action {
        SessionCommands::List => {
            let all = sessions.list_sessions().await?;
            if all.is_empty() {
                println!("no saved sessions");
            }
            let ledger = UsageLedger::new(storage.database()?.clone());
            for session in &all {
                let totals = ledger.totals(None, Some(&session.id.0)).await?;
                println!("{}", summary_line(session, totals.input_tokens + totals.output_tokens));
            }
        }
        SessionCommands::Show { id } => {
            let Some(session) = sessions.get_session(&SessionId(id.clone())).await? else {
                return Err(AiShellError::Internal(format!("session {id} not found")));
            };
            println!("{}", session.title.bold());
            for message in &session.messages {
                let label = match message.role {
                    Role::User => "you".cyan(),
                    Role::Assistant => "aishell".green(),
                    _ => message.role.to_string().dimmed(),
                };
                println!("{label}: {}", message.content.text());
            }
        }
        SessionCommands::Delete { id } => {
            if sessions.delete_session(&SessionId(id.clone())).await? {
                println!("deleted {id}");
            } else {
                println!("no session {id}");
            }
        }
        SessionCommands::Clear => {
            sessions.clear_all().await?;
            println!("all sessions deleted");
        }
    }
    storage.close().await
}

fn summary_line(session: &ChatSession, tokens: u64) -> String {
    format!(
        "{}  {}  {} messages  {} tokens  {}",
        session.id.0.dimmed(),
        session.timestamp.format("%Y-%m-%d %H:%M"),
        session.messages.len(),
        tokens,
        session.title
    )
}
