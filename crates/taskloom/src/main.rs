// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Taskloom - coordinates AI coding-agent work across git worktrees.
//!
//! This binary exposes the project-memory core: project registration,
//! conversation memory (remember/recall/summarize/context), and the
//! offline local-to-remote storage migration.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod bootstrap;
mod memory;
mod migrate;
mod project;
mod status;

/// Taskloom task-board memory core.
#[derive(Parser, Debug)]
#[command(name = "taskloom", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: project::ProjectAction,
    },
    /// Store one conversation turn in project memory.
    Remember {
        project_id: String,
        content: String,
        /// Session the turn belongs to.
        #[arg(long, default_value = "cli")]
        session: String,
        /// Task to tag the turn with.
        #[arg(long)]
        task: Option<String>,
        /// Role of the speaker: user, agent, or system.
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Semantic search over project memory.
    Recall {
        project_id: String,
        query: String,
        /// Number of results.
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
    /// Regenerate the rolling project summary.
    Summarize {
        project_id: String,
        /// Reason recorded with the update.
        #[arg(long, default_value = "manual")]
        trigger: String,
    },
    /// Aggregate memory context: recent turns, summary, relevant hits.
    Context {
        project_id: String,
        /// Optional query for the relevant-hits section.
        #[arg(long)]
        query: Option<String>,
    },
    /// Migrate a project from embedded to remote storage.
    Migrate {
        project_id: String,
        /// Plan and report only; write nothing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show storage status and remote capability.
    Status {
        project_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match taskloom_config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("taskloom: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let problems = taskloom_config::validate(&config);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("taskloom: config error: {problem}");
        }
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Project { action } => project::run(&config, action).await,
        Commands::Remember {
            project_id,
            content,
            session,
            task,
            role,
        } => memory::remember(&config, &project_id, &content, &session, task.as_deref(), &role)
            .await,
        Commands::Recall { project_id, query, k } => {
            memory::recall(&config, &project_id, &query, k).await
        }
        Commands::Summarize { project_id, trigger } => {
            memory::summarize(&config, &project_id, &trigger).await
        }
        Commands::Context { project_id, query } => {
            memory::context(&config, &project_id, query.as_deref()).await
        }
        Commands::Migrate { project_id, dry_run } => {
            migrate::run(&config, &project_id, dry_run).await
        }
        Commands::Status { project_id } => status::run(&config, project_id.as_deref()).await,
    };
    std::process::exit(code);
}
