// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process host used when the shell runs outside an editor.
//!
//! Answers bridge requests from a scratch query buffer. There is no database
//! connection, so query requests fail with a message the model can relay.

use std::sync::{Arc, Mutex};

use aishell_bridge::host::names;
use aishell_bridge::{BridgeHost, BridgeRequest, BridgeResponse};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const NOT_CONNECTED: &str =
    "no database connection; run AI Shell from the host application to execute queries";

/// Scratch editor state.
#[derive(Debug, Default)]
pub struct ScratchEditor {
    pub text: String,
}

impl ScratchEditor {
    fn answer(&mut self, request: &BridgeRequest) -> Result<Value, String> {
        let text_arg = || {
            request
                .args
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        match request.name.as_str() {
            names::GET_QUERY_TEXT => Ok(json!(self.text)),
            names::GET_QUERY_TEXT_WITH_CURSOR => {
                Ok(json!({ "text": self.text, "cursor": self.text.chars().count() }))
            }
            names::INSERT_TEXT | names::INSERT_TEXT_AT_CURSOR => {
                self.text.push_str(&text_arg());
                Ok(Value::Null)
            }
            names::SET_QUERY_TEXT => {
                self.text = text_arg();
                Ok(Value::Null)
            }
            names::GET_TAB_LIST => Ok(json!([
                { "id": "scratch", "title": "Scratch", "active": true }
            ])),
            names::SWITCH_TO_TAB => match request.args.get("tabId").and_then(Value::as_str) {
                Some("scratch") => Ok(Value::Null),
                other => Err(format!("unknown tab {}", other.unwrap_or("<none>"))),
            },
            names::GET_ACTIVE_DATABASE => Ok(Value::Null),
            names::GET_EXECUTION_PLAN | names::GET_STATISTICS_DATA | names::GET_MESSAGES_DATA => {
                Err("nothing has been executed in this shell".to_string())
            }
            names::RUN_QUERY | names::FETCH_OBJECT_SCHEMA => Err(NOT_CONNECTED.to_string()),
            other => Err(format!("unsupported request {other}")),
        }
    }
}

/// Serves `rx` from `editor`. The task lives as long as `host`'s transport
/// can still send, so callers abort it on shutdown.
pub fn spawn_local_host(
    host: &BridgeHost,
    mut rx: mpsc::UnboundedReceiver<BridgeRequest>,
    editor: Arc<Mutex<ScratchEditor>>,
) -> JoinHandle<()> {
    let transport = host.transport().clone();
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let answer = editor
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .answer(&request);
            debug!(request = %request.name, ok = answer.is_ok(), "local host answered");
            let response = match answer {
                Ok(result) => BridgeResponse::ok(request.id, result),
                Err(error) => BridgeResponse::err(request.id, error),
            };
            transport.deliver(response);
        }
    })
}
