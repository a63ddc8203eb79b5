// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Size-to-window staircase.
//!
//! As the serialized history grows, fewer trailing turns are kept. Each
//! provider class has its own steps; anthropic-like providers step down
//! earlier because of their per-minute input token accounting.

/// `(size_below, keep)`: histories smaller than `size_below` JSON units keep
/// at most `keep` trailing non-system messages. Past the last step the last
/// `keep` applies.
const STANDARD_STEPS: &[(usize, Option<usize>)] = &[
    (48_000, None),
    (96_000, Some(30)),
    (144_000, Some(20)),
    (usize::MAX, Some(12)),
];

const ANTHROPIC_STEPS: &[(usize, Option<usize>)] = &[
    (16_000, None),
    (32_000, Some(16)),
    (48_000, Some(10)),
    (usize::MAX, Some(6)),
];

/// Maximum trailing non-system messages to keep for a history of
/// `total_json_chars`; `None` keeps everything.
pub fn window_for_size(total_json_chars: usize, anthropic_like: bool) -> Option<usize> {
    let steps = if anthropic_like {
        ANTHROPIC_STEPS
    } else {
        STANDARD_STEPS
    };
    steps
        .iter()
        .find(|(below, _)| total_json_chars < *below)
        .and_then(|(_, keep)| *keep)
}
