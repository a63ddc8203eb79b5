// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end conversation tests.
//!
//! `TestHarness` assembles a complete orchestrator with mock collaborators
//! and in-memory storage. The same [`MockProvider`] answers for every
//! registered provider id, so tests pick a policy row by picking an id.

use std::sync::{Arc, Mutex};

use aishell_agent::{HeuristicDetector, Orchestrator, OrchestratorParts, ProviderSet, SendOutcome};
use aishell_bus::{BusEvent, BusEventKind, EventBus};
use aishell_config::model::{AiShellConfig, SubstitutionRule};
use aishell_core::{AiShellError, Notification, NotificationKind, Notifier, SendOptions};
use aishell_cost::CreditsGate;
use aishell_investigation::{
    ContextStack, InvestigationToolkit, InvestigationTracker, SchemaFirstGuard,
    register_investigation_tools,
};
use aishell_resilience::{BackoffConfig, PolicyTable, RateLimitGovernor};
use aishell_storage::ChatSessionStore;
use aishell_tools::{PermissionBroker, ToolGateway, ToolRegistry, register_builtin_tools};
use tokio::sync::broadcast;

use crate::memory_store::MemoryStore;
use crate::mock_host::{MockHostBridge, MockQueryExecutor};
use crate::mock_provider::{MockProvider, Scripted};
use crate::recorders::{RecordingUsageLogger, StaticCredits};

/// Provider ids the mock is registered under.
pub const PROVIDER_IDS: [&str; 4] = ["anthropic", "openai", "google", "openai-compatible"];

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    script: Vec<Scripted>,
    provider: String,
    model: String,
    auto_resume: bool,
    minimum_queries: Option<u32>,
    read_only_auto_approval: bool,
    reviewer: bool,
    substitutions: Option<Vec<SubstitutionRule>>,
    credits: Option<StaticCredits>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            script: Vec::new(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            auto_resume: false,
            minimum_queries: None,
            read_only_auto_approval: false,
            reviewer: false,
            substitutions: None,
            credits: None,
        }
    }

    /// Scripted replies, consumed one per model round-trip.
    pub fn with_script(mut self, script: Vec<Scripted>) -> Self {
        self.script = script;
        self
    }

    /// Default provider id and model for `send`.
    pub fn with_provider(mut self, provider: &str, model: &str) -> Self {
        self.provider = provider.to_string();
        self.model = model.to_string();
        self
    }

    pub fn with_auto_resume(mut self, enabled: bool) -> Self {
        self.auto_resume = enabled;
        self
    }

    pub fn with_minimum_queries(mut self, minimum: u32) -> Self {
        self.minimum_queries = Some(minimum);
        self
    }

    pub fn with_read_only_auto_approval(mut self, enabled: bool) -> Self {
        self.read_only_auto_approval = enabled;
        self
    }

    pub fn with_reviewer(mut self, enabled: bool) -> Self {
        self.reviewer = enabled;
        self
    }

    pub fn with_substitutions(mut self, rules: Vec<SubstitutionRule>) -> Self {
        self.substitutions = Some(rules);
        self
    }

    pub fn with_credits(mut self, credits: StaticCredits) -> Self {
        self.credits = Some(credits);
        self
    }

    /// Build the harness, wiring every subsystem.
    pub fn build(self) -> TestHarness {
        let mut config = AiShellConfig::default();
        config.agent.default_provider = self.provider.clone();
        config.agent.default_model = self.model.clone();
        config.agent.system_prompt = Some("You are a test assistant.".to_string());
        config.orchestrator.auto_resume_enabled = self.auto_resume;
        config.orchestrator.reviewer_enabled = self.reviewer;
        if let Some(rules) = self.substitutions {
            config.orchestrator.substitutions = rules;
        }
        if let Some(minimum) = self.minimum_queries {
            config.investigation.minimum_required_queries = minimum;
        }
        config.tools.allow_execution_of_read_only_queries = self.read_only_auto_approval;
        let config = Arc::new(config);

        let bus = EventBus::new();
        let events = bus.subscribe();
        let notifier: Arc<dyn Notifier> = Arc::new(bus.clone());

        let store = Arc::new(MemoryStore::new());
        let sessions = ChatSessionStore::new(store.clone(), &config.session);
        let contexts = ContextStack::new(store.clone(), config.investigation.context_stack_limit);

        let provider = Arc::new(MockProvider::with_script(self.script));
        let providers = PROVIDER_IDS
            .iter()
            .fold(ProviderSet::new(), |set, id| set.with(*id, provider.clone()));

        let governor = Arc::new(RateLimitGovernor::new(
            Arc::new(PolicyTable::from_config(&config.policies)),
            BackoffConfig::from(&config.rate_limit),
            notifier.clone(),
        ));
        let credits = self.credits.map(Arc::new);
        let credits_gate = Arc::new(CreditsGate::new(
            credits
                .clone()
                .map(|c| c as Arc<dyn aishell_core::CreditsAdapter>),
            notifier,
            &config.credits,
        ));
        let usage = Arc::new(RecordingUsageLogger::new());

        let host = Arc::new(MockHostBridge::default());
        let server = Arc::new(MockQueryExecutor::new());
        let tracker = Arc::new(InvestigationTracker::new(&config.investigation));
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, host.clone(), server.clone(), &config.tools);
        register_investigation_tools(
            &mut registry,
            Arc::new(InvestigationToolkit {
                tracker: tracker.clone(),
                executor: server.clone(),
                contexts: contexts.clone(),
                tools_config: config.tools.clone(),
            }),
        );
        let broker = Arc::new(PermissionBroker::default());
        let gateway = Arc::new(
            ToolGateway::new(Arc::new(registry), broker.clone(), &config.tools)
                .with_guard(Arc::new(SchemaFirstGuard::new(tracker.clone()))),
        );

        let orchestrator = Orchestrator::new(OrchestratorParts {
            config: config.clone(),
            providers,
            governor,
            credits: credits_gate,
            usage: usage.clone(),
            gateway,
            tracker,
            contexts: contexts.clone(),
            sessions: sessions.clone(),
            bus: bus.clone(),
            detector: Arc::new(HeuristicDetector),
        });

        TestHarness {
            orchestrator,
            provider,
            host,
            server,
            usage,
            credits,
            store,
            sessions,
            contexts,
            broker,
            bus,
            config,
            events: Mutex::new(events),
        }
    }
}

/// A complete conversation stack over mock collaborators.
pub struct TestHarness {
    pub orchestrator: Arc<Orchestrator>,
    pub provider: Arc<MockProvider>,
    pub host: Arc<MockHostBridge>,
    pub server: Arc<MockQueryExecutor>,
    pub usage: Arc<RecordingUsageLogger>,
    pub credits: Option<Arc<StaticCredits>>,
    pub store: Arc<MemoryStore>,
    pub sessions: ChatSessionStore,
    pub contexts: ContextStack,
    pub broker: Arc<PermissionBroker>,
    pub bus: EventBus,
    pub config: Arc<AiShellConfig>,
    events: Mutex<broadcast::Receiver<BusEvent>>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Options for the configured default provider and model.
    pub fn options(&self) -> SendOptions {
        SendOptions::new(
            &self.config.agent.default_provider,
            &self.config.agent.default_model,
        )
    }

    /// Sends `text` with the default options.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, AiShellError> {
        self.orchestrator.send(text, self.options()).await
    }

    /// Bus events published since the last drain.
    pub fn drain_events(&self) -> Vec<BusEventKind> {
        let mut rx = self.events.lock().unwrap();
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => out.push(event.kind),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    /// Notifications published since the last drain. Drains all events.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.drain_events()
            .into_iter()
            .filter_map(|kind| match kind {
                BusEventKind::Notification(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Notifications of one kind since the last drain. Drains all events.
    pub fn drain_notifications_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.drain_notifications()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    /// Waits until at least `count` tool calls await a decision.
    pub async fn wait_for_pending(&self, count: usize) {
        let mut rx = self.broker.subscribe();
        loop {
            if rx.borrow_and_update().len() >= count {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
