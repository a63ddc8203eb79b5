// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation streaming orchestrator.
//!
//! Each turn runs `Idle -> Sending -> Streaming -> {Finished | Errored} -> Idle`,
//! with `Sending -> Streaming` repeated for every tool round-trip. At most one
//! turn is in flight per conversation; an overlapping send is refused with a
//! notice and has no other effect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use aishell_bus::{BusEventKind, EventBus};
use aishell_config::model::AiShellConfig;
use aishell_context::{
    LOCAL_MEMORY_MARKER, SanitizeConstraints, fit_request, sanitize_for_transport,
};
use aishell_core::types::{ProviderRequest, StreamEventType, ToolUseData, UsageRecord};
use aishell_core::{
    AiShellError, ContentBlock, ContentPart, ConversationMessage, MessageContent, Notification,
    NotificationKind, Notifier, ProviderAdapter, ProviderMessage, Role, SendOptions, SessionId,
    TokenUsage, UsageLogger,
};
use aishell_cost::CreditsGate;
use aishell_investigation::{
    ContextStack, InvestigationTracker, OptionKind, Resolution, parse_bare_number,
};
use aishell_resilience::{RateLimitGovernor, classify_error};
use aishell_storage::{ChatSessionStore, SessionMetadata};
use aishell_tools::{PermissionBroker, ToolCall, ToolGateway};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::preflight::{DEFAULT_SYSTEM_PROMPT, assemble_system_prompt, find_substitution};
use crate::restore::{ClearReason, ExternalWrite, GuardState, RestoreGuard};
use crate::resume::{ContinuationDetector, ResumeReason, ResumeScheduler, TurnDigest, resume_key};
use crate::reviewer::reviewer_notes;

/// Lifecycle of the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Sending,
    Streaming,
    Finished,
    Errored,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
            Self::Errored => "errored",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// Summary of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub text: String,
    pub usage: TokenUsage,
    pub tool_calls: usize,
    /// Model round-trips, including tool steps.
    pub steps: usize,
    /// Model actually used, after any substitution.
    pub model: String,
    /// Continuation scheduled for this turn, if any.
    pub resume: Option<ResumeReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Completed(TurnReport),
    /// Another turn was in flight; nothing happened.
    Busy,
}

/// Provider adapters keyed by provider id.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ProviderAdapter>, AiShellError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| AiShellError::AdapterNotFound {
                adapter_type: "provider".to_string(),
                name: id.to_string(),
            })
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Collaborators an orchestrator is built from.
pub struct OrchestratorParts {
    pub config: Arc<AiShellConfig>,
    pub providers: ProviderSet,
    pub governor: Arc<RateLimitGovernor>,
    pub credits: Arc<CreditsGate>,
    pub usage: Arc<dyn UsageLogger>,
    pub gateway: Arc<ToolGateway>,
    pub tracker: Arc<InvestigationTracker>,
    pub contexts: ContextStack,
    pub sessions: ChatSessionStore,
    pub bus: EventBus,
    pub detector: Arc<dyn ContinuationDetector>,
}

struct Conversation {
    session_id: Option<SessionId>,
    metadata: SessionMetadata,
    messages: Vec<ConversationMessage>,
    options: SendOptions,
    turn_state: TurnState,
    /// Last text the user typed; continuation prompts do not replace it.
    last_user_text: Option<String>,
}

struct Flight {
    id: u64,
    cancel: CancellationToken,
}

/// Holds the single-flight slot for one turn and frees it on drop.
struct FlightGuard<'a> {
    slot: &'a Mutex<Option<Flight>>,
    id: u64,
    cancel: CancellationToken,
}

impl FlightGuard<'_> {
    fn is_current(&self) -> bool {
        lock(self.slot).as_ref().is_some_and(|f| f.id == self.id)
    }

    fn check(&self) -> Result<(), AiShellError> {
        if self.cancel.is_cancelled() {
            Err(AiShellError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if slot.as_ref().is_some_and(|f| f.id == self.id) {
            *slot = None;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// What one streamed model response contained.
#[derive(Debug, Default)]
struct StreamedResponse {
    text: String,
    tool_uses: Vec<ToolUseData>,
    usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnKind {
    User,
    Continuation,
}

/// Drives one conversation.
pub struct Orchestrator {
    me: Weak<Orchestrator>,
    label: String,
    config: Arc<AiShellConfig>,
    providers: ProviderSet,
    governor: Arc<RateLimitGovernor>,
    credits: Arc<CreditsGate>,
    usage: Arc<dyn UsageLogger>,
    gateway: Arc<ToolGateway>,
    tracker: Arc<InvestigationTracker>,
    contexts: ContextStack,
    sessions: ChatSessionStore,
    bus: EventBus,
    detector: Arc<dyn ContinuationDetector>,
    guard: RestoreGuard,
    resume: ResumeScheduler,
    conversation: Mutex<Conversation>,
    flight: Mutex<Option<Flight>>,
    next_flight: AtomicU64,
    resume_task: Mutex<Option<JoinHandle<Option<Result<SendOutcome, AiShellError>>>>>,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Arc<Self> {
        let options = SendOptions {
            provider_id: parts.config.agent.default_provider.clone(),
            model_id: parts.config.agent.default_model.clone(),
            system_prompt: None,
            temperature: parts.config.agent.temperature,
        };
        let label = SessionId::generate().0;
        info!(conversation = %label, provider = %options.provider_id, model = %options.model_id, "conversation opened");

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            label,
            guard: RestoreGuard::new(&parts.config.session),
            resume: ResumeScheduler::new(std::time::Duration::from_millis(
                parts.config.orchestrator.auto_resume_debounce_ms,
            )),
            conversation: Mutex::new(Conversation {
                session_id: None,
                metadata: SessionMetadata::default(),
                messages: Vec::new(),
                options,
                turn_state: TurnState::Idle,
                last_user_text: None,
            }),
            flight: Mutex::new(None),
            next_flight: AtomicU64::new(0),
            resume_task: Mutex::new(None),
            config: parts.config,
            providers: parts.providers,
            governor: parts.governor,
            credits: parts.credits,
            usage: parts.usage,
            gateway: parts.gateway,
            tracker: parts.tracker,
            contexts: parts.contexts,
            sessions: parts.sessions,
            bus: parts.bus,
            detector: parts.detector,
        })
    }

    // --- Accessors ---

    /// Copy of the canonical message list.
    pub fn messages(&self) -> Vec<ConversationMessage> {
        lock(&self.conversation).messages.clone()
    }

    /// Options the next request will use, including any substitution.
    pub fn current_options(&self) -> SendOptions {
        lock(&self.conversation).options.clone()
    }

    pub fn set_options(&self, options: SendOptions) {
        lock(&self.conversation).options = options;
    }

    pub fn turn_state(&self) -> TurnState {
        lock(&self.conversation).turn_state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        lock(&self.conversation).session_id.clone()
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    pub fn set_metadata(&self, metadata: SessionMetadata) {
        lock(&self.conversation).metadata = metadata;
    }

    pub fn tracker(&self) -> &Arc<InvestigationTracker> {
        &self.tracker
    }

    pub fn gateway(&self) -> &Arc<ToolGateway> {
        &self.gateway
    }

    // --- Turns ---

    /// Sends a user message and runs the turn to completion.
    pub async fn send(&self, text: &str, options: SendOptions) -> Result<SendOutcome, AiShellError> {
        if text.trim().is_empty() {
            return Err(AiShellError::NoContentToSend);
        }
        let Some(flight) = self.begin_flight() else {
            info!(conversation = %self.label, "send refused, turn in flight");
            self.notify(Notification::new(
                NotificationKind::Busy,
                "A response is still in progress. Wait for it to finish or stop it first.",
            ));
            return Ok(SendOutcome::Busy);
        };

        self.guard.note_user_send();
        self.resume.begin_user_turn();
        self.tracker.begin_turn();
        self.gateway.clear_finished();
        {
            let mut conv = lock(&self.conversation);
            conv.messages.push(ConversationMessage::user(text));
            conv.options = options;
            conv.last_user_text = Some(text.to_string());
        }

        let selection = self.resolve_selection(text).await;
        self.run_turn(&flight, selection, TurnKind::User).await
    }

    /// Re-runs the last user message with the current options.
    pub async fn retry(&self) -> Result<SendOutcome, AiShellError> {
        let Some(flight) = self.begin_flight() else {
            self.notify(Notification::new(
                NotificationKind::Busy,
                "A response is still in progress.",
            ));
            return Ok(SendOutcome::Busy);
        };

        let last_user = {
            let mut conv = lock(&self.conversation);
            let Some(idx) = conv.messages.iter().rposition(|m| m.role == Role::User) else {
                return Err(AiShellError::NoContentToSend);
            };
            conv.messages.truncate(idx + 1);
            conv.messages[idx].content.text()
        };
        info!(conversation = %self.label, "retrying last user message");

        self.guard.note_user_send();
        self.resume.begin_user_turn();
        self.tracker.begin_turn();
        self.gateway.clear_finished();
        let selection = self.resolve_selection(&last_user).await;
        self.run_turn(&flight, selection, TurnKind::User).await
    }

    /// Stops the turn in flight. Pending permission requests are declined,
    /// and the single-flight slot is free when this returns.
    pub fn abort(&self) -> bool {
        let taken = lock(&self.flight).take();
        self.resume.cancel();
        let declined = self.gateway.broker().reject_all();
        match taken {
            Some(flight) => {
                flight.cancel.cancel();
                self.publish_state(TurnState::Idle);
                info!(conversation = %self.label, declined, "turn aborted");
                true
            }
            None => false,
        }
    }

    /// Waits for a scheduled auto-continuation and returns its outcome.
    pub async fn settle(&self) -> Option<Result<SendOutcome, AiShellError>> {
        let handle = lock(&self.resume_task).take()?;
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "auto-resume task failed");
                None
            }
        }
    }

    // --- Restore and external writes ---

    /// Loads a persisted session into this conversation.
    pub async fn restore(&self, id: &SessionId) -> Result<Vec<ConversationMessage>, AiShellError> {
        let session = self
            .sessions
            .get_session(id)
            .await?
            .ok_or_else(|| AiShellError::Internal(format!("session {id} not found")))?;
        let messages = self.restore_snapshot(session.messages);
        let mut conv = lock(&self.conversation);
        conv.session_id = Some(session.id);
        conv.metadata = session.metadata;
        Ok(messages)
    }

    /// Replaces the conversation with `snapshot` and opens the guard window.
    pub fn restore_snapshot(&self, snapshot: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        self.abort();
        self.tracker.reset();
        self.gateway.clear_finished();
        let messages = self.guard.restore(snapshot);
        lock(&self.conversation).messages = messages.clone();
        messages
    }

    /// Applies a rehydration from outside the orchestrator through the guard.
    pub async fn apply_external(&self, incoming: Vec<ConversationMessage>) -> ExternalWrite {
        let outcome = self.guard.protected_set(incoming);
        lock(&self.conversation).messages = outcome.messages().to_vec();
        if let ExternalWrite::OverwrittenBack(_) = &outcome {
            self.persist().await;
        }
        outcome
    }

    /// Empties the conversation.
    pub async fn clear(&self, reason: ClearReason) -> Result<(), AiShellError> {
        self.abort();
        self.guard.clear(reason);
        self.tracker.reset();
        self.gateway.clear_finished();
        let session_id = {
            let mut conv = lock(&self.conversation);
            conv.messages.clear();
            conv.metadata = SessionMetadata::default();
            conv.last_user_text = None;
            conv.session_id.take()
        };
        match reason {
            ClearReason::NewChat => self.sessions.flush().await?,
            ClearReason::SessionDeleted => {
                if let Some(id) = session_id {
                    self.sessions.delete_session(&id).await?;
                }
            }
            ClearReason::AllSessionsCleared => self.sessions.clear_all().await?,
        }
        Ok(())
    }

    // --- Internals ---

    fn begin_flight(&self) -> Option<FlightGuard<'_>> {
        let mut slot = lock(&self.flight);
        if slot.is_some() {
            return None;
        }
        let id = self.next_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *slot = Some(Flight {
            id,
            cancel: cancel.clone(),
        });
        Some(FlightGuard {
            slot: &self.flight,
            id,
            cancel,
        })
    }

    fn notify(&self, notification: Notification) {
        self.bus.notify(notification);
    }

    fn publish_state(&self, state: TurnState) {
        lock(&self.conversation).turn_state = state;
        debug!(conversation = %self.label, state = state.as_str(), "turn state");
        self.bus.publish(BusEventKind::TurnState {
            session_id: self.label.clone(),
            state: state.as_str().to_string(),
        });
    }

    fn set_state(&self, flight: &FlightGuard<'_>, state: TurnState) {
        if flight.is_current() {
            self.publish_state(state);
        }
    }

    async fn resolve_selection(&self, text: &str) -> Option<String> {
        let number = parse_bare_number(text)?;
        match self.contexts.resolve_number(number).await {
            Ok(Resolution::Found { kind, option }) => {
                let label = match kind {
                    OptionKind::NextStep => "next step",
                    OptionKind::Recommendation => "recommendation",
                };
                debug!(number, label, "bare number resolved");
                Some(format!(
                    "[The user selected {label} {number} from the latest investigation: \"{}\". Call retrieve_investigation_context with number {number} if you need the full context, then carry it out.]",
                    option.text
                ))
            }
            Ok(Resolution::NotFound { number, available }) => {
                let list = available
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(format!(
                    "[The user typed {number}, but the latest investigation only offers options {list}. Ask which one they meant.]"
                ))
            }
            Ok(Resolution::NoContext) => None,
            Err(e) => {
                warn!(error = %e, "could not read investigation contexts");
                None
            }
        }
    }

    /// Sanitized history with the selection note and local memory attached
    /// to the last user message. The canonical list is left untouched.
    fn outbound_history(
        &self,
        constraints: &SanitizeConstraints,
        selection: Option<&str>,
    ) -> Result<Vec<ProviderMessage>, AiShellError> {
        let (mut messages, metadata) = {
            let conv = lock(&self.conversation);
            (conv.messages.clone(), conv.metadata.clone())
        };
        let memory = memory_block(&metadata);
        if (selection.is_some() || memory.is_some())
            && let Some(last) = messages.iter_mut().rev().find(|m| m.role == Role::User)
        {
            let mut text = last.content.text();
            if let Some(note) = selection {
                text.push_str("\n\n");
                text.push_str(note);
            }
            if let Some(block) = memory {
                text.push_str("\n\n");
                text.push_str(&block);
            }
            last.content = MessageContent::Text(text);
        }
        let outbound = sanitize_for_transport(&messages, constraints)?;
        Ok(outbound.iter().map(ProviderMessage::from).collect())
    }

    async fn run_turn(
        &self,
        flight: &FlightGuard<'_>,
        selection: Option<String>,
        kind: TurnKind,
    ) -> Result<SendOutcome, AiShellError> {
        let started = std::time::Instant::now();
        let result = self.exchange(flight, selection.as_deref()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let options = self.current_options();
        let session_id = self.session_id().map(|id| id.0);

        match result {
            Ok(mut report) => {
                self.set_state(flight, TurnState::Finished);
                info!(
                    conversation = %self.label,
                    model = %report.model,
                    input_tokens = report.usage.input_tokens,
                    output_tokens = report.usage.output_tokens,
                    tool_calls = report.tool_calls,
                    steps = report.steps,
                    "turn finished"
                );
                self.log_usage(UsageRecord {
                    provider: options.provider_id.clone(),
                    model: report.model.clone(),
                    input_tokens: report.usage.input_tokens,
                    output_tokens: report.usage.output_tokens,
                    duration_ms,
                    success: true,
                    error: None,
                    session_id,
                })
                .await;
                self.persist().await;
                if kind == TurnKind::User {
                    report.resume = self.maybe_schedule_resume(&report, &options);
                }
                self.set_state(flight, TurnState::Idle);
                Ok(SendOutcome::Completed(report))
            }
            Err(e) => {
                self.set_state(flight, TurnState::Errored);
                self.surface_error(&e);
                self.log_usage(UsageRecord {
                    provider: options.provider_id.clone(),
                    model: options.model_id.clone(),
                    input_tokens: 0,
                    output_tokens: 0,
                    duration_ms,
                    success: false,
                    error: Some(e.to_string()),
                    session_id,
                })
                .await;
                self.persist().await;
                self.set_state(flight, TurnState::Idle);
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        flight: &FlightGuard<'_>,
        selection: Option<&str>,
    ) -> Result<TurnReport, AiShellError> {
        let cfg = &self.config;
        let mut options = self.current_options();
        if let Some(sub) = find_substitution(&options, &cfg.orchestrator.substitutions) {
            warn!(from = %sub.from_model, to = %sub.to_model, reason = %sub.reason, "model substituted");
            self.notify(
                Notification::new(NotificationKind::Fallback, sub.notice()).with_payload(
                    serde_json::json!({
                        "provider": sub.provider,
                        "from": sub.from_model,
                        "to": sub.to_model,
                    }),
                ),
            );
            options.model_id = sub.to_model;
            lock(&self.conversation).options = options.clone();
        }

        let provider = self.providers.get(&options.provider_id)?;
        let policy = self.governor.policies().policy(&options.provider_id).clone();
        self.tracker
            .set_minimum_required(policy.minimum_required_queries);
        let constraints = SanitizeConstraints::for_policy(&cfg.sanitizer, policy.anthropic_like);
        let history = self.outbound_history(&constraints, selection)?;

        let base_prompt = options
            .system_prompt
            .clone()
            .or_else(|| cfg.agent.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let notes = if cfg.orchestrator.reviewer_enabled {
            self.review(flight, provider.as_ref(), &options).await?
        } else {
            Vec::new()
        };
        let system_prompt = assemble_system_prompt(&base_prompt, &notes, policy.system_prompt_cap);
        let tools = self.gateway.registry().tool_definitions();

        let mut scratch: Vec<ProviderMessage> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut tool_calls = 0usize;
        let mut steps = 0usize;
        let mut final_text = String::new();
        let max_steps = cfg.orchestrator.max_tool_steps.max(1);

        while steps < max_steps {
            steps += 1;
            let messages = fit_request(&history, &scratch, &constraints);
            let request = ProviderRequest {
                model: options.model_id.clone(),
                system_prompt: Some(system_prompt.clone()),
                messages,
                max_tokens: cfg.agent.max_tokens,
                temperature: options.temperature.or(cfg.agent.temperature),
                stream: true,
                tools: tools.clone(),
            };

            let response = self
                .request_with_retry(flight, provider.as_ref(), &options, request)
                .await?;
            usage.accumulate(&response.usage);

            if response.tool_uses.is_empty() {
                final_text = response.text;
                if !final_text.trim().is_empty() {
                    lock(&self.conversation)
                        .messages
                        .push(ConversationMessage::assistant(final_text.clone()));
                }
                break;
            }

            let mut parts = Vec::new();
            let mut assistant_blocks = Vec::new();
            if !response.text.trim().is_empty() {
                parts.push(ContentPart::Text {
                    text: response.text.clone(),
                });
                assistant_blocks.push(ContentBlock::Text {
                    text: response.text.clone(),
                });
            }
            let mut result_blocks = Vec::new();
            for tool_use in response.tool_uses {
                flight.check()?;
                let call = ToolCall::new(&tool_use.id, &tool_use.name, tool_use.input.clone());
                let result = self.gateway.execute(&call).await;
                tool_calls += 1;
                parts.push(ContentPart::ToolInvocation {
                    tool_call_id: tool_use.id.clone(),
                    tool_name: tool_use.name.clone(),
                    args: tool_use.input.clone(),
                    result: serde_json::to_value(&result).ok(),
                });
                result_blocks.push(result.to_content_block(&tool_use.id));
                assistant_blocks.push(ContentBlock::ToolUse {
                    id: tool_use.id,
                    name: tool_use.name,
                    input: tool_use.input,
                });
            }
            flight.check()?;
            lock(&self.conversation)
                .messages
                .push(ConversationMessage::new(Role::Assistant, MessageContent::Parts(parts)));
            scratch.push(ProviderMessage {
                role: Role::Assistant.to_string(),
                content: assistant_blocks,
            });
            scratch.push(ProviderMessage {
                role: Role::User.to_string(),
                content: result_blocks,
            });

            if steps == max_steps {
                warn!(conversation = %self.label, max_steps, "tool step limit reached");
                self.notify(Notification::new(
                    NotificationKind::Warning,
                    format!("Stopped after {max_steps} tool steps. Send a message to continue."),
                ));
            }
        }

        Ok(TurnReport {
            text: final_text,
            usage,
            tool_calls,
            steps,
            model: options.model_id,
            resume: None,
        })
    }

    /// Reviewer notes for the last user message. Only a credits refusal
    /// stops the turn; every other failure yields no notes.
    async fn review(
        &self,
        flight: &FlightGuard<'_>,
        provider: &dyn ProviderAdapter,
        options: &SendOptions,
    ) -> Result<Vec<String>, AiShellError> {
        let request_text = {
            let conv = lock(&self.conversation);
            conv.messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.text())
        };
        let Some(request_text) = request_text else {
            return Ok(Vec::new());
        };
        let model = self
            .config
            .orchestrator
            .reviewer_model
            .clone()
            .unwrap_or_else(|| options.model_id.clone());

        self.credits.check().await?;
        if let Err(e) = self.governor.acquire(&options.provider_id, &model).await {
            warn!(error = %e, "reviewer pass skipped");
            return Ok(Vec::new());
        }
        flight.check()?;
        let notes = tokio::select! {
            notes = reviewer_notes(provider, &model, &request_text) => notes,
            _ = flight.cancel.cancelled() => return Err(AiShellError::Cancelled),
        };
        Ok(notes)
    }

    /// One model round-trip under the credits gate and the governor, retried
    /// as the governor allows.
    async fn request_with_retry(
        &self,
        flight: &FlightGuard<'_>,
        provider: &dyn ProviderAdapter,
        options: &SendOptions,
        request: ProviderRequest,
    ) -> Result<StreamedResponse, AiShellError> {
        let (provider_id, model) = (options.provider_id.as_str(), options.model_id.as_str());
        loop {
            flight.check()?;
            self.credits.check().await?;
            tokio::select! {
                acquired = self.governor.acquire(provider_id, model) => acquired?,
                _ = flight.cancel.cancelled() => return Err(AiShellError::Cancelled),
            }

            self.set_state(flight, TurnState::Sending);
            let attempt = async {
                let stream = provider.stream(request.clone()).await?;
                self.set_state(flight, TurnState::Streaming);
                collect_stream(stream).await
            };
            let outcome = tokio::select! {
                outcome = attempt => outcome,
                _ = flight.cancel.cancelled() => Err(AiShellError::Cancelled),
            };

            match outcome {
                Ok(response) => {
                    self.governor.record_success(provider_id, model);
                    return Ok(response);
                }
                Err(AiShellError::Cancelled) => return Err(AiShellError::Cancelled),
                Err(e) => {
                    let entry = self.governor.record_failure(provider_id, model, &e);
                    if !entry.retry {
                        return Err(e);
                    }
                    debug!(attempt = entry.attempt, wait_ms = entry.wait.as_millis() as u64, "retrying request");
                    tokio::select! {
                        _ = tokio::time::sleep(entry.wait) => {}
                        _ = flight.cancel.cancelled() => return Err(AiShellError::Cancelled),
                    }
                }
            }
        }
    }

    /// Tells the user about a failed turn unless a collaborator already did.
    fn surface_error(&self, err: &AiShellError) {
        match err {
            AiShellError::Cancelled => {
                debug!(conversation = %self.label, "turn cancelled");
            }
            AiShellError::CreditsExhausted { .. } => {}
            AiShellError::RateLimited { wait, message } => {
                self.notify(
                    Notification::new(NotificationKind::RateLimit, message.clone())
                        .with_payload(serde_json::json!({ "waitMs": wait.as_millis() as u64 })),
                );
            }
            AiShellError::NoContentToSend => {
                self.notify(Notification::new(
                    NotificationKind::Warning,
                    "There is nothing to send after trimming the conversation.",
                ));
            }
            other if classify_error(other).is_rate_limited() => {}
            other => {
                error!(conversation = %self.label, error = %other, "turn failed");
                self.notify(Notification::new(NotificationKind::Error, other.to_string()));
            }
        }
    }

    async fn log_usage(&self, record: UsageRecord) {
        if let Err(e) = self.usage.log_usage(record).await {
            warn!(error = %e, "usage logging failed");
        }
    }

    /// Routine debounced write of the conversation.
    async fn persist(&self) {
        let (session_id, messages, metadata) = {
            let conv = lock(&self.conversation);
            (conv.session_id.clone(), conv.messages.clone(), conv.metadata.clone())
        };
        let result = match session_id {
            Some(id) => self
                .sessions
                .update_session(&id, messages, Some(metadata))
                .await
                .map(|updated| updated.then_some(id)),
            None => self
                .sessions
                .create_session(messages, metadata)
                .await
                .map(|created| created.map(|s| s.id)),
        };
        match result {
            Ok(Some(id)) => {
                lock(&self.conversation).session_id.get_or_insert_with(|| id.clone());
                self.bus.publish(BusEventKind::SessionPersisted { session_id: id.0 });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "session persistence failed"),
        }
    }

    fn maybe_schedule_resume(&self, report: &TurnReport, options: &SendOptions) -> Option<ResumeReason> {
        if !self.config.orchestrator.auto_resume_enabled {
            return None;
        }
        let policy = self.governor.policies().policy(&options.provider_id);
        let digest = TurnDigest {
            final_text: report.text.clone(),
            usage: report.usage,
            tool_calls: report.tool_calls,
            investigation_below_minimum: self.tracker.below_minimum(),
        };
        let reason = self.detector.assess(&digest)?;
        if !policy.auto_resume_allowed {
            debug!(provider = %options.provider_id, reason = reason.as_str(), "auto-resume disabled for provider");
            return None;
        }
        let last_user = lock(&self.conversation).last_user_text.clone()?;
        let key = resume_key(reason, &last_user);
        if !self.resume.try_schedule(&key) {
            return None;
        }
        let me = self.me.upgrade()?;
        info!(conversation = %self.label, reason = reason.as_str(), "auto-resume scheduled");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(me.resume.debounce()).await;
            me.run_continuation(&key, reason).await
        });
        *lock(&self.resume_task) = Some(handle);
        Some(reason)
    }

    async fn run_continuation(
        &self,
        key: &str,
        reason: ResumeReason,
    ) -> Option<Result<SendOutcome, AiShellError>> {
        if !self.resume.take(key) {
            debug!(key, "auto-resume superseded");
            return None;
        }
        let Some(flight) = self.begin_flight() else {
            debug!(key, "auto-resume skipped, turn in flight");
            return None;
        };
        info!(conversation = %self.label, reason = reason.as_str(), "auto-resuming");
        lock(&self.conversation)
            .messages
            .push(ConversationMessage::user(reason.prompt()));
        Some(self.run_turn(&flight, None, TurnKind::Continuation).await)
    }
}

/// Reads a provider stream to the end.
async fn collect_stream(
    mut stream: aishell_core::ProviderStream,
) -> Result<StreamedResponse, AiShellError> {
    let mut out = StreamedResponse::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.event_type == StreamEventType::Error {
            return Err(AiShellError::provider(
                chunk.error.unwrap_or_else(|| "stream error".to_string()),
            ));
        }
        if let Some(text) = chunk.text {
            out.text.push_str(&text);
        }
        if let Some(tool_use) = chunk.tool_use {
            out.tool_uses.push(tool_use);
        }
        if let Some(usage) = chunk.usage {
            out.usage = usage;
        }
        if chunk.event_type == StreamEventType::MessageStop {
            break;
        }
    }
    Ok(out)
}

/// Hidden memory block appended after the user's text.
fn memory_block(metadata: &SessionMetadata) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(summary) = metadata.memory_summary.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("Conversation summary: {}", summary.trim()));
    }
    if let Some(sql) = metadata.memory_last_sql.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("Last SQL: {}", sql.trim()));
    }
    if let Some(db) = metadata
        .memory_last_database
        .as_deref()
        .or(metadata.database.as_deref())
        .filter(|s| !s.trim().is_empty())
    {
        lines.push(format!("Database: {}", db.trim()));
    }
    if lines.is_empty() {
        return None;
    }
    Some(format!("{LOCAL_MEMORY_MARKER}\n{}", lines.join("\n")))
}

/// Mirrors the set of pending permission requests onto the bus.
pub fn spawn_permission_forwarder(broker: &PermissionBroker, bus: EventBus) -> JoinHandle<()> {
    let mut rx = broker.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let tool_call_ids = rx
                .borrow_and_update()
                .iter()
                .map(|p| p.tool_call_id.clone())
                .collect();
            bus.publish(BusEventKind::PermissionsPending { tool_call_ids });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_block_starts_with_marker() {
        let meta = SessionMetadata {
            memory_summary: Some("tuning tempdb".into()),
            database: Some("Sales".into()),
            ..SessionMetadata::default()
        };
        let block = memory_block(&meta).unwrap();
        assert!(block.starts_with(LOCAL_MEMORY_MARKER));
        assert!(block.contains("Conversation summary: tuning tempdb"));
        assert!(block.contains("Database: Sales"));
        assert!(memory_block(&SessionMetadata::default()).is_none());
    }

    #[test]
    fn turn_state_labels() {
        assert!(TurnState::Sending.is_busy());
        assert!(TurnState::Streaming.is_busy());
        assert!(!TurnState::Finished.is_busy());
        assert_eq!(TurnState::Errored.as_str(), "errored");
    }

    #[test]
    fn provider_set_reports_missing_adapter() {
        let set = ProviderSet::new();
        assert!(matches!(
            set.get("openai"),
            Err(AiShellError::AdapterNotFound { name, .. }) if name == "openai"
        ));
    }
}
