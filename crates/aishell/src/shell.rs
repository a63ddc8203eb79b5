// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `aishell shell` command implementation.
//!
//! Launches an interactive REPL over one conversation. Tool calls that need
//! approval are put to the user inline while the turn waits; Ctrl+C during a
//! turn stops it.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aishell_agent::{
    ClearReason, HeuristicDetector, Orchestrator, OrchestratorParts, ProviderSet, SendOutcome,
    TurnReport, spawn_permission_forwarder,
};
use aishell_anthropic::AnthropicProvider;
use aishell_bridge::BridgeHost;
use aishell_bus::{BusEvent, BusEventKind, EventBus};
use aishell_config::model::AiShellConfig;
use aishell_core::{
    AiShellError, Notification, NotificationKind, Notifier, SendOptions, SessionId,
    StorageAdapter,
};
use aishell_cost::{CreditsGate, UsageLedger};
use aishell_investigation::{
    ContextStack, InvestigationToolkit, InvestigationTracker, SchemaFirstGuard,
    register_investigation_tools,
};
use aishell_resilience::{BackoffConfig, PolicyTable, RateLimitGovernor};
use aishell_storage::{ChatSessionStore, SqliteStore};
use aishell_tools::{
    PendingToolCall, PermissionBroker, ToolGateway, ToolRegistry, register_builtin_tools,
};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::local_host::{ScratchEditor, spawn_local_host};
use crate::sessions::open_store;

/// Slash commands understood by the REPL.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Quit,
    Help,
    New,
    Retry,
    Sessions,
    Restore(String),
    Delete,
    ClearAll,
    Model { provider: String, model: String },
    ReadOnly(bool),
    Editor,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<ShellCommand> {
    let rest = line.trim().strip_prefix('/')?;
    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();
    Some(match (name, args.as_slice()) {
        ("quit" | "exit", _) => ShellCommand::Quit,
        ("help", _) => ShellCommand::Help,
        ("new", _) => ShellCommand::New,
        ("retry", _) => ShellCommand::Retry,
        ("sessions", _) => ShellCommand::Sessions,
        ("restore", [id]) => ShellCommand::Restore((*id).to_string()),
        ("delete", _) => ShellCommand::Delete,
        ("clear-all", _) => ShellCommand::ClearAll,
        ("model", [provider, model]) => ShellCommand::Model {
            provider: (*provider).to_string(),
            model: (*model).to_string(),
        },
        ("readonly", ["on"]) => ShellCommand::ReadOnly(true),
        ("readonly", ["off"]) => ShellCommand::ReadOnly(false),
        ("editor", _) => ShellCommand::Editor,
        _ => ShellCommand::Unknown(line.trim().to_string()),
    })
}

const HELP: &str = "\
/new                     start a new chat
/retry                   re-run the last message
/sessions                list saved sessions
/restore <id>            load a saved session
/delete                  delete the current session
/clear-all               delete every saved session
/model <provider> <id>   switch provider and model
/readonly on|off         auto-approve read-only queries
/editor                  show the scratch query buffer
/quit                    exit";

/// Everything one shell conversation needs.
struct Shell {
    orchestrator: Arc<Orchestrator>,
    broker: Arc<PermissionBroker>,
    gateway: Arc<ToolGateway>,
    sessions: ChatSessionStore,
    bus: EventBus,
    editor: Arc<Mutex<ScratchEditor>>,
}

type Background = Vec<tokio::task::JoinHandle<()>>;

async fn build_shell(
    config: AiShellConfig,
) -> Result<(Shell, Arc<SqliteStore>, Background), AiShellError> {
    let config = Arc::new(config);
    let (storage, sessions) = open_store(&config).await?;
    let bus = EventBus::new();
    let notifier: Arc<dyn Notifier> = Arc::new(bus.clone());

    let provider = AnthropicProvider::new(&config.anthropic).inspect_err(|_| {
        eprintln!(
            "error: Anthropic API key required. Set it in aishell.toml under [anthropic] or via AISHELL_ANTHROPIC_API_KEY / ANTHROPIC_API_KEY"
        );
    })?;
    let providers = ProviderSet::new().with("anthropic", Arc::new(provider));

    let governor = Arc::new(RateLimitGovernor::new(
        Arc::new(PolicyTable::from_config(&config.policies)),
        BackoffConfig::from(&config.rate_limit),
        notifier.clone(),
    ));
    let credits = Arc::new(CreditsGate::new(None, notifier, &config.credits));
    let usage = Arc::new(UsageLedger::new(storage.database()?.clone()));

    let (host, rx) = BridgeHost::from_config(&config.bridge);
    let editor = Arc::new(Mutex::new(ScratchEditor::default()));
    let host_task = spawn_local_host(&host, rx, editor.clone());
    let host = Arc::new(host);

    let tracker = Arc::new(InvestigationTracker::new(&config.investigation));
    let contexts = ContextStack::new(storage.clone(), config.investigation.context_stack_limit);
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, host.clone(), host.clone(), &config.tools);
    register_investigation_tools(
        &mut registry,
        Arc::new(InvestigationToolkit {
            tracker: tracker.clone(),
            executor: host,
            contexts: contexts.clone(),
            tools_config: config.tools.clone(),
        }),
    );
    info!(tools = registry.len(), "tool registry initialized");

    let broker = Arc::new(PermissionBroker::new(
        config.tools.permission_timeout_secs.map(Duration::from_secs),
    ));
    let gateway = Arc::new(
        ToolGateway::new(Arc::new(registry), broker.clone(), &config.tools)
            .with_guard(Arc::new(SchemaFirstGuard::new(tracker.clone()))),
    );
    let forwarder = spawn_permission_forwarder(&broker, bus.clone());

    let orchestrator = Orchestrator::new(OrchestratorParts {
        config,
        providers,
        governor,
        credits,
        usage,
        gateway: gateway.clone(),
        tracker,
        contexts,
        sessions: sessions.clone(),
        bus: bus.clone(),
        detector: Arc::new(HeuristicDetector),
    });

    let shell = Shell {
        orchestrator,
        broker,
        gateway,
        sessions,
        bus,
        editor,
    };
    Ok((shell, storage, vec![host_task, forwarder]))
}

/// Runs the `aishell shell` interactive REPL.
pub async fn run_shell(config: AiShellConfig, resume: Option<String>) -> Result<(), AiShellError> {
    let (shell, storage, tasks) = build_shell(config).await?;
    let printer = spawn_notification_printer(shell.bus.subscribe());

    if let Some(id) = resume {
        let messages = shell.orchestrator.restore(&SessionId(id.clone())).await?;
        println!("{}", format!("restored {id} ({} messages)", messages.len()).dimmed());
    }

    let mut rl = DefaultEditor::new()
        .map_err(|e| AiShellError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "aishell".bold().green());
    println!("Type {} for commands, {} to exit.\n", "/help".yellow(), "/quit".yellow());

    let prompt = format!("{}> ", "aishell".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                match parse_command(trimmed) {
                    Some(ShellCommand::Quit) => break,
                    Some(command) => {
                        if let Err(e) = shell.command(command).await {
                            eprintln!("{}: {e}", "error".red());
                        }
                    }
                    None => {
                        let orchestrator = shell.orchestrator.clone();
                        let options = orchestrator.current_options();
                        let text = trimmed.to_string();
                        let outcome = shell
                            .drive(async move { orchestrator.send(&text, options).await })
                            .await;
                        shell.finish(outcome).await;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    shell.orchestrator.abort();
    shell.sessions.flush().await?;
    for task in tasks {
        task.abort();
    }
    printer.abort();
    storage.close().await
}

impl Shell {
    async fn command(&self, command: ShellCommand) -> Result<(), AiShellError> {
        match command {
            ShellCommand::Quit => {}
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::New => {
                self.orchestrator.clear(ClearReason::NewChat).await?;
                println!("{}", "new chat".dimmed());
            }
            ShellCommand::Retry => {
                let orchestrator = self.orchestrator.clone();
                let outcome = self.drive(async move { orchestrator.retry().await }).await;
                self.finish(outcome).await;
            }
            ShellCommand::Sessions => {
                for session in self.sessions.list_sessions().await? {
                    println!(
                        "{}  {}  {}",
                        session.id.0.dimmed(),
                        session.timestamp.format("%Y-%m-%d %H:%M"),
                        session.title
                    );
                }
            }
            ShellCommand::Restore(id) => {
                let messages = self.orchestrator.restore(&SessionId(id)).await?;
                println!("{}", format!("restored {} messages", messages.len()).dimmed());
            }
            ShellCommand::Delete => {
                self.orchestrator.clear(ClearReason::SessionDeleted).await?;
                println!("{}", "session deleted".dimmed());
            }
            ShellCommand::ClearAll => {
                self.orchestrator.clear(ClearReason::AllSessionsCleared).await?;
                println!("{}", "all sessions deleted".dimmed());
            }
            ShellCommand::Model { provider, model } => {
                let mut options = SendOptions::new(provider, model);
                options.system_prompt = self.orchestrator.current_options().system_prompt;
                println!("{}", format!("using {}", options.key()).dimmed());
                self.orchestrator.set_options(options);
            }
            ShellCommand::ReadOnly(allow) => {
                self.gateway.set_allow_read_only_queries(allow);
                println!(
                    "{}",
                    format!("read-only auto-approval {}", if allow { "on" } else { "off" }).dimmed()
                );
            }
            ShellCommand::Editor => {
                let text = self
                    .editor
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .text
                    .clone();
                println!("{}", if text.is_empty() { "(empty)".dimmed().to_string() } else { text });
            }
            ShellCommand::Unknown(line) => {
                println!("unknown command {line}; try /help");
            }
        }
        Ok(())
    }

    /// Runs `turn` to completion, prompting for tool permissions as they
    /// come up. Ctrl+C aborts the turn.
    async fn drive<T, F>(&self, turn: F) -> Option<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let mut events = self.bus.subscribe();
        let mut turn = tokio::spawn(turn);
        loop {
            tokio::select! {
                joined = &mut turn => {
                    return match joined {
                        Ok(out) => Some(out),
                        Err(e) => {
                            eprintln!("{}: turn task failed: {e}", "error".red());
                            None
                        }
                    };
                }
                event = events.recv() => match event {
                    Ok(BusEvent { kind: BusEventKind::PermissionsPending { tool_call_ids }, .. })
                        if !tool_call_ids.is_empty() =>
                    {
                        self.prompt_pending().await;
                    }
                    Err(RecvError::Lagged(_)) => self.prompt_pending().await,
                    Err(RecvError::Closed) => {}
                    Ok(_) => {}
                },
                _ = tokio::signal::ctrl_c() => {
                    if self.orchestrator.abort() {
                        eprintln!("{}", "stopped".yellow());
                    }
                }
            }
        }
    }

    async fn prompt_pending(&self) {
        for call in self.broker.pending() {
            match ask_permission(&call).await {
                Answer::Yes => {
                    self.broker.accept(&call.tool_call_id);
                }
                Answer::All => {
                    self.broker.accept_all();
                    return;
                }
                Answer::No => {
                    self.broker.reject(&call.tool_call_id);
                }
            }
        }
    }

    /// Prints a turn outcome and follows any scheduled continuation.
    async fn finish(&self, outcome: Option<Result<SendOutcome, AiShellError>>) {
        let mut outcome = outcome;
        while let Some(result) = outcome.take() {
            match result {
                Ok(SendOutcome::Completed(report)) => {
                    print_report(&report);
                    if let Some(reason) = report.resume {
                        println!("{}", format!("continuing automatically ({})", reason.as_str()).dimmed());
                        let orchestrator = self.orchestrator.clone();
                        outcome = self
                            .drive(async move { orchestrator.settle().await })
                            .await
                            .flatten();
                    }
                }
                Ok(SendOutcome::Busy) => {}
                Err(AiShellError::Cancelled) => debug!("turn cancelled"),
                // Failures are already announced on the bus.
                Err(e) => debug!(error = %e, "turn failed"),
            }
        }
    }
}

fn print_report(report: &TurnReport) {
    if !report.text.trim().is_empty() {
        println!("{}", report.text);
    }
    println!(
        "{}",
        format!(
            "[{} | {} in / {} out | {} tool calls]",
            report.model, report.usage.input_tokens, report.usage.output_tokens, report.tool_calls
        )
        .dimmed()
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    All,
}

fn parse_answer(input: &str) -> Answer {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "a" | "all" => Answer::All,
        _ => Answer::No,
    }
}

async fn ask_permission(call: &PendingToolCall) -> Answer {
    eprint!(
        "{} allow {} ({})? [y/N/a] ",
        "permission".yellow().bold(),
        call.tool_name.bold(),
        call.tool_call_id.dimmed()
    );
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await;
    match line {
        Ok(Ok(line)) => parse_answer(&line),
        _ => Answer::No,
    }
}

fn spawn_notification_printer(
    mut events: tokio::sync::broadcast::Receiver<BusEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BusEvent {
                    kind: BusEventKind::Notification(notification),
                    ..
                }) => print_notification(&notification),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_notification(notification: &Notification) {
    let label = match notification.kind {
        NotificationKind::Error => "error".red(),
        NotificationKind::Warning | NotificationKind::Busy => "warning".yellow(),
        NotificationKind::RateLimit => "rate limit".yellow(),
        NotificationKind::Credits => "credits".yellow(),
        NotificationKind::Fallback => "model".cyan(),
        NotificationKind::Info => "info".cyan(),
    };
    eprintln!("{label}: {}", notification.message);
}
