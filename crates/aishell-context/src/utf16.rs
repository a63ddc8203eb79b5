// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UTF-16 aware length, truncation and surrogate scrubbing.
//!
//! Budgets are counted in UTF-16 code units because that is how the
//! providers and the host measure string length. Truncation always lands on
//! a `char` boundary, so a surrogate pair is never bisected.

/// Appended (or prepended, for tail truncation) to shortened text.
pub const TRUNCATION_NOTE: &str = "…[truncated]";

/// Length of `s` in UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Longest prefix of `s` with at most `max` UTF-16 units.
fn prefix_within(s: &str, max: usize) -> &str {
    let mut units = 0;
    for (idx, ch) in s.char_indices() {
        units += ch.len_utf16();
        if units > max {
            return &s[..idx];
        }
    }
    s
}

/// Longest suffix of `s` with at most `max` UTF-16 units.
fn suffix_within(s: &str, max: usize) -> &str {
    let mut units = 0;
    for (idx, ch) in s.char_indices().rev() {
        units += ch.len_utf16();
        if units > max {
            return &s[idx + ch.len_utf8()..];
        }
    }
    s
}

/// Shortens `s` to at most `max` UTF-16 units, keeping the head.
pub fn truncate_head(s: &str, max: usize) -> String {
    if utf16_len(s) <= max {
        return s.to_string();
    }
    let note = utf16_len(TRUNCATION_NOTE);
    if max <= note {
        return prefix_within(s, max).to_string();
    }
    format!("{}{TRUNCATION_NOTE}", prefix_within(s, max - note))
}

/// Shortens `s` to at most `max` UTF-16 units, keeping the tail.
pub fn truncate_tail(s: &str, max: usize) -> String {
    if utf16_len(s) <= max {
        return s.to_string();
    }
    let note = utf16_len(TRUNCATION_NOTE);
    if max <= note {
        return suffix_within(s, max).to_string();
    }
    format!("{TRUNCATION_NOTE}{}", suffix_within(s, max - note))
}

/// Decodes host-supplied UTF-16, dropping unpaired surrogates instead of
/// substituting U+FFFD.
pub fn decode_utf16_scrubbed(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .filter_map(Result::ok)
        .collect()
}

/// Removes lone-surrogate artifacts from `s`.
///
/// A Rust string cannot hold an unpaired surrogate, but one can still reach
/// the payload as a U+FFFD left by lossy decoding or as a literal `\uD83D`
/// escape copied from another JSON document. Both are removed; a literal
/// high/low escape pair is kept.
pub fn scrub_lone_surrogates(s: &str) -> String {
    if !s.contains('\u{FFFD}') && !s.contains("\\u") && !s.contains("\\U") {
        return s.to_string();
    }

    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if let Some(unit) = escaped_unit(bytes, i) {
            if is_high(unit) {
                if let Some(next) = escaped_unit(bytes, i + 6)
                    && is_low(next)
                {
                    out.push_str(&s[i..i + 12]);
                    i += 12;
                    continue;
                }
                i += 6;
                continue;
            }
            if is_low(unit) {
                i += 6;
                continue;
            }
        }
        // `i` only advances by whole chars or ASCII escapes.
        let ch = s[i..].chars().next().unwrap_or_default();
        if ch != '\u{FFFD}' {
            out.push(ch);
        }
        i += ch.len_utf8().max(1);
    }
    out
}

/// Parses a `\uXXXX` escape starting at byte `at`.
fn escaped_unit(bytes: &[u8], at: usize) -> Option<u16> {
    let esc = bytes.get(at..at + 6)?;
    if esc[0] != b'\\' || !(esc[1] == b'u' || esc[1] == b'U') {
        return None;
    }
    let hex = std::str::from_utf8(&esc[2..]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}

fn is_high(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_astral_chars_as_two_units() {
        assert_eq!(utf16_len("abc"), 3);
        assert_eq!(utf16_len("😀"), 2);
        assert_eq!(utf16_len("é"), 1);
    }

    #[test]
    fn head_truncation_respects_budget_and_pairs() {
        let s = "ab😀😀😀😀😀😀😀😀😀😀😀😀😀cd";
        let t = truncate_head(s, 16);
        assert!(utf16_len(&t) <= 16);
        assert!(t.starts_with("ab"));
        assert!(t.ends_with(TRUNCATION_NOTE));
    }

    #[test]
    fn tail_truncation_keeps_end() {
        let s = format!("{}END-OF-MEMORY", "x".repeat(100));
        let t = truncate_tail(&s, 30);
        assert!(t.ends_with("END-OF-MEMORY"));
        assert!(t.starts_with(TRUNCATION_NOTE));
        assert!(utf16_len(&t) <= 30);
    }

    #[test]
    fn short_strings_unchanged() {
        assert_eq!(truncate_head("hello", 5), "hello");
        assert_eq!(truncate_tail("hello", 50), "hello");
    }

    #[test]
    fn tiny_budget_skips_note() {
        assert_eq!(truncate_head("hello world", 3), "hel");
        assert_eq!(truncate_tail("hello world", 3), "rld");
    }

    #[test]
    fn decode_drops_unpaired_units() {
        // "a", lone high surrogate, "b", valid pair for 😀
        let units = [0x61, 0xD83D, 0x62, 0xD83D, 0xDE00];
        assert_eq!(decode_utf16_scrubbed(&units), "ab😀");
    }

    #[test]
    fn scrub_removes_lone_escapes_and_replacement_chars() {
        assert_eq!(scrub_lone_surrogates("a\\uD83Db"), "ab");
        assert_eq!(scrub_lone_surrogates("a\\udc00b"), "ab");
        assert_eq!(scrub_lone_surrogates("a\u{FFFD}b"), "ab");
        assert_eq!(scrub_lone_surrogates("pair \\uD83D\\uDE00 ok"), "pair \\uD83D\\uDE00 ok");
        assert_eq!(scrub_lone_surrogates("plain \\u0041 text"), "plain \\u0041 text");
        assert_eq!(scrub_lone_surrogates("héllo 😀"), "héllo 😀");
    }
}
