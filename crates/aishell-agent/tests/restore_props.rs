// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for restore normalization.

use aishell_agent::{ExternalWrite, RestoreGuard};
use aishell_config::model::SessionConfig;
use aishell_core::{ContentPart, ConversationMessage, MessageContent, Role};
use proptest::prelude::*;
use serde_json::{Value, json};

fn config() -> SessionConfig {
    SessionConfig {
        part_size_ceiling: 400,
        part_preview_chars: 100,
        ..SessionConfig::default()
    }
}

fn payload_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-z ]{0,30}".prop_map(Value::String),
        "\\PC{0,1500}".prop_map(Value::String),
        proptest::collection::vec("[a-z_]{1,12}", 0..120).prop_map(|cols| json!({ "columns": cols })),
        (0u32..5000).prop_map(|n| json!({ "rowCount": n })),
    ]
}

fn part_strategy() -> impl Strategy<Value = ContentPart> {
    prop_oneof![
        "\\PC{0,900}".prop_map(|text| ContentPart::Text { text }),
        (payload_strategy(), proptest::option::of(payload_strategy())).prop_map(|(args, result)| {
            ContentPart::ToolInvocation {
                tool_call_id: "toolu_1".into(),
                tool_name: "run_diagnostic_query".into(),
                args,
                result,
            }
        }),
        payload_strategy().prop_map(|data| ContentPart::Other {
            kind: "reasoning".into(),
            data,
        }),
    ]
}

fn message_strategy() -> impl Strategy<Value = ConversationMessage> {
    (
        any::<bool>(),
        proptest::option::of("[a-z0-9]{1,8}"),
        prop_oneof![
            "\\PC{0,200}".prop_map(MessageContent::Text),
            proptest::collection::vec(part_strategy(), 0..4).prop_map(MessageContent::Parts),
        ],
    )
        .prop_map(|(user, id, content)| {
            let role = if user { Role::User } else { Role::Assistant };
            let mut msg = ConversationMessage::new(role, content);
            // Blank ids come from older session files.
            msg.id.0 = id.unwrap_or_default();
            msg
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn restoring_twice_is_stable(history in proptest::collection::vec(message_strategy(), 0..12)) {
        let guard = RestoreGuard::new(&config());
        let once = guard.restore(history.clone());
        let twice = guard.restore(once.clone());
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.len(), history.len());
    }

    #[test]
    fn restore_keeps_structured_parts(history in proptest::collection::vec(message_strategy(), 1..12)) {
        let guard = RestoreGuard::new(&config());
        let restored = guard.restore(history.clone());
        for (before, after) in history.iter().zip(&restored) {
            prop_assert!(!after.id.0.trim().is_empty());
            prop_assert_eq!(before.role, after.role);
            prop_assert_eq!(
                before.content.tool_invocations().len(),
                after.content.tool_invocations().len()
            );
        }
    }

    #[test]
    fn restored_snapshot_accepts_itself(history in proptest::collection::vec(message_strategy(), 1..12)) {
        let guard = RestoreGuard::new(&config());
        let restored = guard.restore(history);
        let outcome = guard.protected_set(restored.clone());
        prop_assert!(matches!(outcome, ExternalWrite::Accepted(_)));
        prop_assert_eq!(outcome.messages(), restored.as_slice());
    }
}
