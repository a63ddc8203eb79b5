// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request preparation: model substitution and system prompt assembly.

use aishell_config::model::SubstitutionRule;
use aishell_context::{truncate_head, utf16_len};
use aishell_core::SendOptions;

/// Prompt used when the configuration does not provide one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are AI Shell, an assistant embedded in a SQL Server query editor. \
Help the user write, explain and tune T-SQL. For performance questions, start an investigation, \
fetch the schema of every system view before querying it, run enough diagnostic queries to \
support a conclusion, then give numbered recommendations and next steps. Never run statements \
that modify data unless the user explicitly asks.";

/// Below this many spare characters reviewer notes are not worth appending.
const MIN_NOTES_ROOM: usize = 64;

/// A model swap applied before the request is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub provider: String,
    pub from_model: String,
    pub to_model: String,
    pub reason: String,
}

impl Substitution {
    pub fn notice(&self) -> String {
        format!(
            "Using {} instead of {} ({}).",
            self.to_model, self.from_model, self.reason
        )
    }
}

/// First rule matching the provider and model prefix.
pub fn find_substitution(options: &SendOptions, rules: &[SubstitutionRule]) -> Option<Substitution> {
    rules
        .iter()
        .find(|r| {
            r.provider.eq_ignore_ascii_case(&options.provider_id)
                && options.model_id.starts_with(&r.model_prefix)
                && options.model_id != r.replacement_model
        })
        .map(|r| Substitution {
            provider: options.provider_id.clone(),
            from_model: options.model_id.clone(),
            to_model: r.replacement_model.clone(),
            reason: r.reason.clone(),
        })
}

/// Base prompt plus reviewer notes, never longer than `cap` UTF-16 units.
/// Notes only take the room the base prompt leaves.
pub fn assemble_system_prompt(base: &str, reviewer_notes: &[String], cap: usize) -> String {
    let mut prompt = truncate_head(base.trim(), cap);
    let notes: Vec<&str> = reviewer_notes
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if notes.is_empty() {
        return prompt;
    }

    let mut block = String::from("\n\nReviewer notes (pitfalls to avoid):");
    for note in notes {
        block.push_str("\n- ");
        block.push_str(note);
    }
    let room = cap.saturating_sub(utf16_len(&prompt));
    if room >= MIN_NOTES_ROOM {
        prompt.push_str(&truncate_head(&block, room));
    }
    prompt
}
