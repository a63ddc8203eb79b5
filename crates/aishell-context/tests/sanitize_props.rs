// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for outbound payload safety and size bounds.

use aishell_context::{
    SanitizeConstraints, json_chars, sanitize_for_transport, scrub_lone_surrogates,
};
use aishell_core::{AiShellError, ContentPart, ConversationMessage, MessageContent, Role};
use proptest::prelude::*;

/// True if the JSON text holds no lone-surrogate escapes or U+FFFD.
fn is_surrogate_clean(json: &str) -> bool {
    scrub_lone_surrogates(json).len() == json.len() && !json.contains('\u{FFFD}')
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,40}",
        "\\PC{0,120}",
        Just("emoji 😀😀 and \\uD83D broken".to_string()),
        Just("\u{FFFD}".to_string()),
        "[\"\\\\\n\t]{0,30}",
    ]
}

fn message_strategy() -> impl Strategy<Value = ConversationMessage> {
    (0..5u8, text_strategy(), text_strategy()).prop_map(|(kind, a, b)| match kind {
        0 => ConversationMessage::user(a),
        1 => ConversationMessage::assistant(a),
        2 => ConversationMessage::tool("run_query", a),
        3 => {
            let mut m = ConversationMessage::assistant("");
            m.content = MessageContent::Parts(vec![
                ContentPart::Text { text: a },
                ContentPart::ToolInvocation {
                    tool_call_id: "c".into(),
                    tool_name: "fetch_object_schema".into(),
                    args: serde_json::json!({ "object": b }),
                    result: None,
                },
            ]);
            m
        }
        _ => ConversationMessage::user(format!("{a}{b}")),
    })
}

fn history_strategy() -> impl Strategy<Value = Vec<ConversationMessage>> {
    (
        proptest::option::of("[a-zA-Z ]{1,60}"),
        proptest::collection::vec(message_strategy(), 0..40),
    )
        .prop_map(|(system, rest)| {
            let mut msgs = Vec::new();
            if let Some(s) = system {
                msgs.push(ConversationMessage::system(s));
            }
            msgs.extend(rest);
            msgs
        })
}

fn constraints(total: usize, anthropic_like: bool) -> SanitizeConstraints {
    SanitizeConstraints {
        max_message_chars: 200,
        max_part_json_chars: 400,
        max_total_json_chars: total,
        is_anthropic_like: anthropic_like,
        tool_body_chars: 60,
    }
}

proptest! {
    #[test]
    fn payload_is_surrogate_clean_and_tool_free(
        history in history_strategy(),
        anthropic_like in any::<bool>(),
    ) {
        match sanitize_for_transport(&history, &constraints(4_000, anthropic_like)) {
            Ok(out) => {
                let json = serde_json::to_string(&out).unwrap();
                prop_assert!(is_surrogate_clean(&json), "dirty payload: {json}");
                for msg in &out {
                    prop_assert!(msg.role != Role::Tool);
                    prop_assert!(!msg.content.trim().is_empty());
                }
                prop_assert!(out.iter().any(|m| m.role != Role::System));
            }
            Err(AiShellError::NoContentToSend) => {}
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    #[test]
    fn payload_fits_total_budget(
        history in history_strategy(),
        cap in 600usize..3_000,
    ) {
        let has_system = history
            .first()
            .is_some_and(|m| m.role == Role::System && !m.content.is_blank());
        if let Ok(out) = sanitize_for_transport(&history, &constraints(cap, false)) {
            prop_assert!(json_chars(&out) <= cap, "size {} > cap {cap}", json_chars(&out));
            if has_system {
                prop_assert_eq!(out[0].role, Role::System);
            }
        }
    }
}
