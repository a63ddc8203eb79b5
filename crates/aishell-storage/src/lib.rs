// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for AI Shell.
//!
//! A migrated database behind `tokio-rusqlite`, a key/value
//! [`StorageAdapter`](aishell_core::StorageAdapter) with an AES-256-GCM
//! sealed namespace, and the chat session store built on top of any
//! storage adapter.

pub mod crypto;
pub mod database;
pub mod kv;
pub mod migrations;
pub mod sessions;

pub use database::{Database, map_tr_err};
pub use kv::SqliteStore;
pub use sessions::{ChatSession, ChatSessionStore, SESSIONS_KEY, SessionMetadata, derive_title};
