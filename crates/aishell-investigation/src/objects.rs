// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System catalog object detection in SQL text.

use std::sync::LazyLock;

use regex::Regex;

/// `[db].[schema].[object]`, `schema.object` and friends, brackets and
/// quotes optional, whitespace allowed around the dots.
static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:[\["]?[A-Za-z_][\w$#@]*[\]"]?\s*\.\s*)?[\["]?([A-Za-z_][\w$#@]*)[\]"]?\s*\.\s*[\["]?([A-Za-z_][\w$#@]*)[\]"]?"#,
    )
    .unwrap()
});

/// Canonical `schema.object` spelling: lowercase, no brackets or quotes,
/// database prefix dropped.
pub fn normalize_object_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"'))
        .collect::<String>()
        .to_lowercase();
    let parts: Vec<&str> = cleaned.split('.').map(str::trim).collect();
    match parts.as_slice() {
        [.., schema, object] => format!("{schema}.{object}"),
        _ => cleaned.trim().to_string(),
    }
}

/// Objects in `sql` that live in one of `system_schemas`, normalized and
/// in order of first appearance.
///
/// Comments and string literals are not inspected.
pub fn extract_system_objects(sql: &str, system_schemas: &[String]) -> Vec<String> {
    let code = aishell_tools::sql::strip_comments_and_literals(sql);
    let mut found: Vec<String> = Vec::new();
    for caps in QUALIFIED_NAME.captures_iter(&code) {
        let schema = caps[1].to_lowercase();
        if !system_schemas.iter().any(|s| s.eq_ignore_ascii_case(&schema)) {
            continue;
        }
        let name = format!("{schema}.{}", caps[2].to_lowercase());
        if !found.contains(&name) {
            found.push(name);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> Vec<String> {
        vec!["sys".into(), "information_schema".into()]
    }

    #[test]
    fn finds_dmvs_in_joins() {
        let sql = "SELECT r.session_id, t.text FROM sys.dm_exec_requests r \
                   CROSS APPLY sys.dm_exec_sql_text(r.sql_handle) t \
                   WHERE r.blocking_session_id <> 0";
        assert_eq!(
            extract_system_objects(sql, &system()),
            vec!["sys.dm_exec_requests", "sys.dm_exec_sql_text"]
        );
    }

    #[test]
    fn handles_brackets_database_prefix_and_case() {
        let sql = "select * from [master].[SYS].[Databases]; select * from INFORMATION_SCHEMA . TABLES";
        assert_eq!(
            extract_system_objects(sql, &system()),
            vec!["sys.databases", "information_schema.tables"]
        );
    }

    #[test]
    fn ignores_user_tables_and_alias_columns() {
        let sql = "SELECT o.id, o.total FROM dbo.orders o WHERE o.total > 10";
        assert!(extract_system_objects(sql, &system()).is_empty());
    }

    #[test]
    fn ignores_comments_and_literals() {
        let sql = "-- sys.dm_os_wait_stats\nSELECT 'sys.objects' AS label";
        assert!(extract_system_objects(sql, &system()).is_empty());
    }

    #[test]
    fn duplicates_are_reported_once() {
        let sql = "SELECT * FROM sys.objects a JOIN sys.objects b ON a.parent_object_id = b.object_id";
        assert_eq!(extract_system_objects(sql, &system()), vec!["sys.objects"]);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_object_name("[sys].[dm_exec_requests]"), "sys.dm_exec_requests");
        assert_eq!(normalize_object_name("master.sys.Databases"), "sys.databases");
        assert_eq!(normalize_object_name(" Orders "), "orders");
    }
}
