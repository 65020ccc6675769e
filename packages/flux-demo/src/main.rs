//! Command-line demo for flux-dispatch.
//!
//! Runs the todo/notification/stats scenario, or shows what a circular
//! `wait_for` looks like.

mod config;
mod stores;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flux_dispatch::{Action, DispatchReport};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::stores::{ping_pong, TodoApp};

#[derive(Debug, Parser)]
#[command(name = "flux-demo")]
#[command(about = "Dispatch actions through a set of dependent stores")]
struct Cli {
    /// Print dispatch reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Add todos and show how every store handled each one
    Todos {
        /// Todo text; repeat to add several
        #[arg(long = "add", required = true)]
        add: Vec<String>,

        /// Register notifications and stats before todos
        #[arg(long)]
        notifications_first: bool,

        /// Clear the list after adding
        #[arg(long)]
        clear: bool,
    },

    /// Dispatch to two stores that wait on each other
    Cycle,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Todos {
            add,
            notifications_first,
            clear,
        } => cmd_todos(&config, &add, notifications_first, clear, cli.json),
        Commands::Cycle => cmd_cycle(),
    }
}

fn print_report(report: &DispatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn cmd_todos(
    config: &Config,
    texts: &[String],
    notifications_first: bool,
    clear: bool,
    json: bool,
) -> Result<()> {
    let app = TodoApp::new(config.max_todos, notifications_first)?;
    tracing::info!(stores = ?app.store_names(), "Stores registered");

    let listener = app.notifications.subscribe(|notes| {
        if let Some(message) = notes.messages.last() {
            tracing::info!(%message, "notification");
        }
    });

    for text in texts {
        let report = app
            .add(text)
            .with_context(|| format!("Failed to add todo {text:?}"))?;
        print_report(&report, json)?;
    }
    app.notifications.unsubscribe(listener);

    if clear {
        print_report(&app.clear()?, json)?;
    }

    let todos = app.todos.state()?;
    let stats = app.stats.state()?;
    if json {
        let summary = serde_json::json!({ "todos": &*todos, "stats": &*stats });
        println!("{summary}");
    } else {
        println!("todos: {:?}", todos.items);
        println!(
            "stats: {} added, {} cleared, {} notification(s)",
            stats.added, stats.cleared, stats.notifications_seen
        );
    }
    Ok(())
}

fn cmd_cycle() -> Result<()> {
    let dispatcher = ping_pong()?;
    match dispatcher.dispatch(Action::new("PING", Value::Null)) {
        Err(err) if err.is_circular() => {
            println!("{err}");
            Ok(())
        }
        Err(err) => Err(err).context("Dispatch failed for an unexpected reason"),
        Ok(report) => anyhow::bail!("expected a circular dependency, got {report}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_repeated_add() {
        let cli = Cli::try_parse_from([
            "flux-demo",
            "todos",
            "--add",
            "milk",
            "--add",
            "eggs",
            "--notifications-first",
        ])
        .unwrap();

        match cli.command {
            Commands::Todos {
                add,
                notifications_first,
                clear,
            } => {
                assert_eq!(add, vec!["milk", "eggs"]);
                assert!(notifications_first);
                assert!(!clear);
            }
            other => panic!("Expected Todos, got {other:?}"),
        }
        assert!(!cli.json);
    }

    #[test]
    fn test_todos_requires_add() {
        assert!(Cli::try_parse_from(["flux-demo", "todos"]).is_err());
    }

    #[test]
    fn test_cycle_with_json_flag() {
        let cli = Cli::try_parse_from(["flux-demo", "cycle", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Cycle));
        assert!(cli.json);
    }

    #[test]
    fn test_cycle_command_succeeds() {
        cmd_cycle().unwrap();
    }

    #[test]
    fn test_todos_command_respects_capacity() {
        let config = Config {
            max_todos: 1,
            ..Config::default()
        };
        let texts = vec!["one".to_string(), "two".to_string()];
        let err = cmd_todos(&config, &texts, false, false, false).unwrap_err();
        assert!(err.to_string().contains("\"two\""));
    }
}
