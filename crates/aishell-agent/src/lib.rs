// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation orchestration for AI Shell.
//!
//! The [`Orchestrator`] owns one conversation: it turns user messages into
//! provider requests, runs the tool loop through the gateway, and keeps the
//! canonical history consistent with storage. The [`RestoreGuard`] protects
//! that history from stale rehydration after a restore.

pub mod orchestrator;
pub mod preflight;
pub mod restore;
pub mod resume;
pub mod reviewer;

pub use orchestrator::{
    Orchestrator, OrchestratorParts, ProviderSet, SendOutcome, TurnReport, TurnState,
    spawn_permission_forwarder,
};
pub use preflight::{DEFAULT_SYSTEM_PROMPT, Substitution, assemble_system_prompt, find_substitution};
pub use restore::{ClearReason, ExternalWrite, GuardState, RestoreGuard, Signature};
pub use resume::{
    ContinuationDetector, HeuristicDetector, ResumeReason, ResumeScheduler, TurnDigest, resume_key,
};
pub use reviewer::reviewer_notes;
