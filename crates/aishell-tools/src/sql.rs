// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static read-only classification of T-SQL batches.
//!
//! Conservative: anything the classifier cannot prove is a plain read is
//! treated as a write and goes through the permission handshake.

use std::sync::LazyLock;

use regex::Regex;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_$#@]*").unwrap());

const READ_LEADERS: &[&str] = &["SELECT", "WITH"];

const WRITE_WORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "MERGE",
    "DROP",
    "ALTER",
    "CREATE",
    "TRUNCATE",
    "EXEC",
    "EXECUTE",
    "GRANT",
    "REVOKE",
    "DENY",
    "BACKUP",
    "RESTORE",
    "DBCC",
    "KILL",
    "SHUTDOWN",
    "RECONFIGURE",
    "INTO",
    "BULK",
    "OPENROWSET",
    "OPENQUERY",
    "WRITETEXT",
    "UPDATETEXT",
    "USE",
];

/// Replaces comments, string literals and quoted identifiers with spaces so
/// that keywords inside them are not seen.
fn strip_noise(sql: &str) -> String {
    scrub(sql, false)
}

/// Blanks comments and string literals but leaves `[bracketed]` and `"quoted"` identifiers
/// in place, for callers that need object names.
pub fn strip_comments_and_literals(sql: &str) -> String {
    scrub(sql, true)
}

fn scrub(sql: &str, keep_identifiers: bool) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                out.push(' ');
            }
            '/' if next == Some('*') => {
                // T-SQL block comments nest; an unterminated one runs to the end.
                i = sql_block_end(&chars, i).map_or(chars.len(), |end| end + 1);
                out.push(' ');
            }
            '"' | '[' if keep_identifiers => {
                out.push(c);
                i += 1;
            }
            '\'' | '"' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == c {
                        // Doubled quote is an escaped quote.
                        if chars.get(i + 1) == Some(&c) {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                out.push(' ');
            }
            '[' => {
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i += 1;
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// True when every statement in `sql` is a plain `SELECT` (optionally behind
/// a CTE) with no write, DDL or execution keyword anywhere.
pub fn is_read_only_query(sql: &str) -> bool {
    let cleaned = strip_noise(sql);
    let statements: Vec<&str> = cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if statements.is_empty() {
        return false;
    }

    statements.iter().all(|statement| {
        let words: Vec<String> = WORD
            .find_iter(statement)
            .map(|m| m.as_str().to_ascii_uppercase())
            .collect();
        let Some(first) = words.first() else {
            return false;
        };
        if !READ_LEADERS.contains(&first.as_str()) {
            return false;
        }
        !words.iter().any(|w| {
            WRITE_WORDS.contains(&w.as_str()) || w.starts_with("SP_") || w.starts_with("XP_")
        })
    })
}

/// Cheap structural checks: unterminated literals or comments and
/// unbalanced parentheses. Returns one message per problem found.
pub fn syntax_problems(sql: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if sql.trim().is_empty() {
        problems.push("query is empty".to_string());
        return problems;
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut depth: i64 = 0;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => match sql_block_end(&chars, i) {
                Some(end) => i = end,
                None => {
                    problems.push("unterminated block comment".to_string());
                    break;
                }
            },
            '\'' | '"' | '[' => {
                let close = if c == '[' { ']' } else { c };
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    if chars[j] == close {
                        if close != ']' && chars.get(j + 1) == Some(&close) {
                            j += 2;
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    j += 1;
                }
                if !closed {
                    problems.push(match c {
                        '\'' => "unterminated string literal".to_string(),
                        _ => "unterminated quoted identifier".to_string(),
                    });
                    break;
                }
                i = j + 1;
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    problems.push("unexpected ')'".to_string());
                    depth = 0;
                }
            }
            _ => {}
        }
        i += 1;
    }
    if depth > 0 {
        problems.push(format!("{depth} unclosed '('"));
    }
    problems
}

/// Index of the last char of the block comment opened at `start`.
fn sql_block_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        if chars[i] == '/' && chars[i + 1] == '*' {
            depth += 1;
            i += 2;
        } else if chars[i] == '*' && chars[i + 1] == '/' {
            depth -= 1;
            if depth == 0 {
                return Some(i + 1);
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_selects_are_read_only() {
        assert!(is_read_only_query("SELECT 1"));
        assert!(is_read_only_query(
            "select session_id, blocking_session_id from sys.dm_exec_requests where blocking_session_id <> 0;"
        ));
        assert!(is_read_only_query(
            "WITH waits AS (SELECT * FROM sys.dm_os_wait_stats) SELECT TOP 10 * FROM waits ORDER BY wait_time_ms DESC"
        ));
        assert!(is_read_only_query("SELECT * FROM t WITH (NOLOCK); SELECT 2;"));
    }

    #[test]
    fn writes_are_not_read_only() {
        for sql in [
            "UPDATE t SET a = 1",
            "DELETE FROM t",
            "INSERT INTO t VALUES (1)",
            "SELECT * INTO backup_t FROM t",
            "WITH x AS (SELECT 1 AS a) DELETE FROM t",
            "SELECT 1; DROP TABLE t",
            "EXEC sp_who2",
            "sp_who2",
            "KILL 53",
            "DBCC FREEPROCCACHE",
            "SELECT * FROM OPENROWSET('SQLNCLI', 'x', 'SELECT 1')",
            "USE master",
        ] {
            assert!(!is_read_only_query(sql), "{sql} should not be read-only");
        }
    }

    #[test]
    fn keywords_in_literals_and_comments_are_ignored() {
        assert!(is_read_only_query("SELECT 'DELETE FROM t' AS txt"));
        assert!(is_read_only_query("SELECT 1 -- drop table t\n"));
        assert!(is_read_only_query("/* update /* nested */ insert */ SELECT 1"));
        assert!(is_read_only_query("SELECT [delete] FROM [update]"));
        assert!(is_read_only_query("SELECT 'it''s; DROP TABLE t' AS x"));
    }

    #[test]
    fn syntax_checks() {
        assert!(syntax_problems("SELECT (1 + 2) AS x -- ok (").is_empty());
        assert!(syntax_problems("SELECT 'it''s' FROM [my table]").is_empty());
        assert_eq!(syntax_problems("SELECT (1"), vec!["1 unclosed '('".to_string()]);
        assert_eq!(syntax_problems("SELECT 'oops"), vec!["unterminated string literal".to_string()]);
        assert_eq!(syntax_problems("/* never closed"), vec!["unterminated block comment".to_string()]);
        assert_eq!(syntax_problems("SELECT 1)"), vec!["unexpected ')'".to_string()]);
        assert_eq!(syntax_problems("  "), vec!["query is empty".to_string()]);
    }

    #[test]
    fn empty_or_comment_only_is_not_read_only() {
        assert!(!is_read_only_query(""));
        assert!(!is_read_only_query("   ;  ; "));
        assert!(!is_read_only_query("-- SELECT 1"));
    }
}
