// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message sanitization for AI Shell.
//!
//! Turns the canonical conversation into a payload every provider accepts:
//! text-only `system`/`user`/`assistant` messages within the configured
//! character budgets, free of lone-surrogate artifacts. Requests assembled
//! inside a tool loop are fitted to the same budgets by [`fit_request`].

pub mod payload;
pub mod sanitize;
pub mod utf16;
pub mod window;

pub use payload::{OMITTED_RESULT, fit_provider_message, fit_request};
pub use sanitize::{LOCAL_MEMORY_MARKER, SanitizeConstraints, json_chars, sanitize_for_transport};
pub use utf16::{
    decode_utf16_scrubbed, scrub_lone_surrogates, truncate_head, truncate_tail, utf16_len,
};
pub use window::window_for_size;
