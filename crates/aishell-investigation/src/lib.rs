// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic investigations for AI Shell.
//!
//! The [`InvestigationTracker`] holds the workflow state of one
//! conversation, the [`ContextStack`] keeps concluded investigations so a
//! later bare-number reply can pick an option, and [`tools`] exposes the
//! workflow to the model.

pub mod context;
pub mod objects;
pub mod tools;
pub mod tracker;

pub use context::{
    CONTEXT_STACK_KEY, ContextStack, InvestigationContext, NumberedOption, OptionKind, Resolution,
    parse_bare_number,
};
pub use objects::{extract_system_objects, normalize_object_name};
pub use tools::{InvestigationToolkit, SchemaFirstGuard, register_investigation_tools};
pub use tracker::{InvestigationError, InvestigationPhase, InvestigationTracker, QueryTicket};
