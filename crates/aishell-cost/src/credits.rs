// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-request credit check.
//!
//! No credits, or a failed check, blocks the request. Low credits only warn.

use std::sync::Arc;

use aishell_config::model::CreditsConfig;
use aishell_core::types::CreditsStatus;
use aishell_core::{AiShellError, CreditsAdapter, Notification, NotificationKind, Notifier};
use serde_json::json;
use tracing::{debug, warn};

/// Outcome of a passing credit check.
#[derive(Debug, Clone, PartialEq)]
pub enum CreditsVerdict {
    /// No credits collaborator is configured.
    Unmetered,
    Ok { credits_left: Option<f64> },
    Low { credits_left: f64 },
}

pub struct CreditsGate {
    adapter: Option<Arc<dyn CreditsAdapter>>,
    notifier: Arc<dyn Notifier>,
    low_threshold: f64,
}

impl CreditsGate {
    pub fn new(
        adapter: Option<Arc<dyn CreditsAdapter>>,
        notifier: Arc<dyn Notifier>,
        config: &CreditsConfig,
    ) -> Self {
        Self {
            adapter,
            notifier,
            low_threshold: config.low_credits_threshold,
        }
    }

    /// Consults the credits collaborator before a provider request.
    pub async fn check(&self) -> Result<CreditsVerdict, AiShellError> {
        let Some(adapter) = &self.adapter else {
            return Ok(CreditsVerdict::Unmetered);
        };

        let status = match adapter.check_credits_available().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "credit check failed; blocking request");
                self.notifier.notify(Notification::new(
                    NotificationKind::Error,
                    format!("Could not verify remaining credits: {e}"),
                ));
                return Err(AiShellError::CreditsExhausted {
                    message: format!("credit check failed: {e}"),
                });
            }
        };

        self.judge(status)
    }

    fn judge(&self, status: CreditsStatus) -> Result<CreditsVerdict, AiShellError> {
        if !status.has_credits {
            let message = status
                .message
                .unwrap_or_else(|| "You have no credits left.".to_string());
            self.notifier.notify(
                Notification::new(NotificationKind::Credits, message.clone())
                    .with_payload(json!({ "hasCredits": false, "creditsLeft": status.credits_left })),
            );
            return Err(AiShellError::CreditsExhausted { message });
        }

        match status.credits_left {
            Some(left) if left <= self.low_threshold => {
                debug!(credits_left = left, "credits running low");
                self.notifier.notify(
                    Notification::new(
                        NotificationKind::Warning,
                        format!("Low credits: {left:.2} remaining."),
                    )
                    .with_payload(json!({ "hasCredits": true, "creditsLeft": left })),
                );
                Ok(CreditsVerdict::Low { credits_left: left })
            }
            left => Ok(CreditsVerdict::Ok { credits_left: left }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Fixed(Result<CreditsStatus, String>);

    #[async_trait]
    impl CreditsAdapter for Fixed {
        async fn check_credits_available(&self) -> Result<CreditsStatus, AiShellError> {
            self.0.clone().map_err(AiShellError::Internal)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    fn gate(result: Result<CreditsStatus, String>) -> (CreditsGate, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let gate = CreditsGate::new(
            Some(Arc::new(Fixed(result))),
            recorder.clone(),
            &CreditsConfig::default(),
        );
        (gate, recorder)
    }

    fn status(has_credits: bool, left: Option<f64>) -> CreditsStatus {
        CreditsStatus {
            has_credits,
            credits_left: left,
            message: None,
        }
    }

    #[tokio::test]
    async fn no_adapter_is_unmetered() {
        let gate = CreditsGate::new(None, Arc::new(Recorder::default()), &CreditsConfig::default());
        assert_eq!(gate.check().await.unwrap(), CreditsVerdict::Unmetered);
    }

    #[tokio::test]
    async fn exhausted_blocks_with_credits_notice() {
        let (gate, rec) = gate(Ok(status(false, Some(0.0))));
        let err = gate.check().await.unwrap_err();
        assert!(matches!(err, AiShellError::CreditsExhausted { .. }));
        let notes = rec.0.lock().unwrap();
        assert_eq!(notes[0].kind, NotificationKind::Credits);
    }

    #[tokio::test]
    async fn low_credits_warn_but_pass() {
        let (gate, rec) = gate(Ok(status(true, Some(1.5))));
        assert_eq!(
            gate.check().await.unwrap(),
            CreditsVerdict::Low { credits_left: 1.5 }
        );
        assert_eq!(rec.0.lock().unwrap()[0].kind, NotificationKind::Warning);
    }

    #[tokio::test]
    async fn plenty_is_silent() {
        let (gate, rec) = gate(Ok(status(true, Some(100.0))));
        assert!(matches!(gate.check().await.unwrap(), CreditsVerdict::Ok { .. }));
        assert!(rec.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_check_blocks() {
        let (gate, rec) = gate(Err("network down".into()));
        assert!(gate.check().await.is_err());
        assert_eq!(rec.0.lock().unwrap()[0].kind, NotificationKind::Error);
    }
}
