// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic typed request/response transport.
//!
//! Each request gets a generated id and a oneshot slot in the pending map.
//! The host answers by handing a [`BridgeResponse`] with the same id to
//! [`RequestTransport::deliver`]. A request that is not answered within its
//! timeout resolves to [`AiShellError::Timeout`] and its slot is removed, so
//! a late answer is ignored.

use std::sync::Arc;
use std::time::Duration;

use aishell_core::AiShellError;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// A request sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The host's answer to a [`BridgeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub id: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl BridgeResponse {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result,
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Removes the pending slot when a request future is dropped or times out.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, oneshot::Sender<BridgeResponse>>,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Correlates host requests with their responses.
#[derive(Clone)]
pub struct RequestTransport {
    outbound: mpsc::UnboundedSender<BridgeRequest>,
    pending: Arc<DashMap<String, oneshot::Sender<BridgeResponse>>>,
    default_timeout: Duration,
}

impl RequestTransport {
    /// Creates a transport and the receiver the host reads requests from.
    pub fn new(default_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<BridgeRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: tx,
                pending: Arc::new(DashMap::new()),
                default_timeout,
            },
            rx,
        )
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Sends `name(args)` to the host and waits up to `timeout` for a typed reply.
    pub async fn send<Req, Res>(
        &self,
        name: &str,
        args: &Req,
        timeout: Duration,
    ) -> Result<Res, AiShellError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let args = serde_json::to_value(args).map_err(|e| AiShellError::Bridge {
            message: format!("{name}: cannot encode arguments: {e}"),
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        self.outbound
            .send(BridgeRequest {
                id: id.clone(),
                name: name.to_string(),
                args,
            })
            .map_err(|_| AiShellError::Bridge {
                message: format!("{name}: host channel closed"),
            })?;
        debug!(request = name, id = %id, "bridge request sent");

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(AiShellError::Bridge {
                    message: format!("{name}: transport dropped the request"),
                });
            }
            Err(_) => {
                warn!(request = name, id = %id, timeout_ms = timeout.as_millis() as u64, "bridge request timed out");
                return Err(AiShellError::Timeout { duration: timeout });
            }
        };

        if let Some(error) = response.error {
            return Err(AiShellError::Bridge {
                message: format!("{name}: {error}"),
            });
        }
        serde_json::from_value(response.result).map_err(|e| AiShellError::Bridge {
            message: format!("{name}: unexpected response shape: {e}"),
        })
    }

    /// Same as [`RequestTransport::send`] with the default timeout.
    pub async fn request<Req, Res>(&self, name: &str, args: &Req) -> Result<Res, AiShellError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.send(name, args, self.default_timeout).await
    }

    /// Routes a host response to its waiting request.
    ///
    /// Returns `false` for unknown or already-expired ids.
    pub fn deliver(&self, response: BridgeResponse) -> bool {
        match self.pending.remove(&response.id) {
            Some((_, tx)) => tx.send(response).is_ok(),
            None => {
                debug!(id = %response.id, "late or unknown bridge response ignored");
                false
            }
        }
    }

    /// Requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
