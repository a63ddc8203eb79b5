// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI Shell - a SQL Server assistant.
//!
//! This is the binary entry point.

mod local_host;
mod sessions;
mod shell;

use std::path::PathBuf;

use aishell_config::model::AiShellConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;

/// AI Shell - a SQL Server assistant.
#[derive(Parser, Debug)]
#[command(name = "aishell", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an interactive REPL session.
    Shell {
        /// Resume a saved session instead of starting a new one.
        #[arg(long)]
        resume: Option<String>,
    },
    /// Manage AI Shell configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Inspect saved chat sessions.
    Sessions {
        #[command(subcommand)]
        action: Option<SessionCommands>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate configuration and print the effective values.
    Check {
        /// Validate this file instead of the standard locations.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommands {
    /// List saved sessions, newest first.
    List,
    /// Print the messages of one session.
    Show { id: String },
    /// Delete one session.
    Delete { id: String },
    /// Delete every saved session.
    Clear,
}

fn load_config(path: Option<&PathBuf>) -> AiShellConfig {
    let loaded = match path {
        Some(path) => aishell_config::load_and_validate_path(path),
        None => aishell_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            aishell_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aishell={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config {
            action: ConfigCommands::Check { path },
        }) => {
            let config = load_config(path.as_ref());
            print_config_summary(&config);
            Ok(())
        }
        Some(Commands::Shell { resume }) => {
            let config = load_config(None);
            init_tracing(&config.agent.log_level);
            shell::run_shell(config, resume).await
        }
        Some(Commands::Sessions { action }) => {
            let config = load_config(None);
            init_tracing(&config.agent.log_level);
            sessions::run_sessions(&config, action.unwrap_or(SessionCommands::List)).await
        }
        None => {
            println!("aishell: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

fn print_config_summary(config: &AiShellConfig) {
    println!("{}", "configuration is valid".green());
    println!("  provider      {} ({})", config.agent.default_provider, config.agent.default_model);
    println!("  database      {}", config.storage.database_path);
    println!(
        "  evidence      {} queries (floor {})",
        config.investigation.minimum_required_queries, config.investigation.query_floor
    );
    println!(
        "  auto-resume   {}",
        if config.orchestrator.auto_resume_enabled { "on" } else { "off" }
    );
    println!(
        "  read-only     {}",
        if config.tools.allow_execution_of_read_only_queries {
            "auto-approved"
        } else {
            "ask"
        }
    );
    if !config.policies.is_empty() {
        let providers: Vec<&str> = config.policies.iter().map(|p| p.provider.as_str()).collect();
        println!("  policy rows   {}", providers.join(", "));
    }
}
