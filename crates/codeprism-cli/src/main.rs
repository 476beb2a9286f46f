//! codeprism-cli: command-line entry point for the codeprism knowledge index.

mod commands_data;
mod commands_search;

use clap::{Parser, Subcommand};
use codeprism_core::CodeprismConfig;
use codeprism_sync::Codeprism;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "codeprism",
    about = "Cross-repository code knowledge index for AI coding assistants"
)]
#[command(version, propagate_version = true)]
struct Cli {
    /// Config file (defaults to ~/.codeprism/config.toml)
    #[arg(long, global = true, env = "CODEPRISM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind (defaults to server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Start the tool server (JSON-RPC over stdio)
    Mcp,

    /// Watch repositories and sync changes as they happen
    Watch {
        /// Repositories as name=path (defaults to repos with a configured root)
        repos: Vec<String>,

        /// Also serve the HTTP API from this process
        #[arg(long)]
        serve: bool,
    },

    /// Search knowledge cards
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only cards valid on this branch
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Show index statistics
    Stats,

    /// Remove data of branches that no longer exist in a checkout
    Gc {
        /// Repository name
        repo: String,

        /// Path to the repository checkout
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON-RPC in tool-server mode.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CODEPRISM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codeprism=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let cp = Arc::new(Codeprism::open(config)?);

    match cli.command {
        Commands::Serve { bind } => commands_data::cmd_serve(cp, bind)?,
        Commands::Mcp => commands_data::cmd_mcp(cp)?,
        Commands::Watch { repos, serve } => {
            let specs = commands_data::resolve_repos(&repos, cp.config())?;
            commands_data::cmd_watch(cp, specs, serve)?;
        }
        Commands::Search { query, limit, branch } => {
            commands_search::cmd_search(&cp, &query, limit, branch.as_deref())?;
        }
        Commands::Stats => commands_search::cmd_stats(&cp)?,
        Commands::Gc { repo, path } => commands_data::cmd_gc(&cp, &repo, &path)?,
    }

    Ok(())
}

// ── Helpers (shared across modules) ────────────────────────────────────────

/// Explicit config file, else the default location; env overrides on top.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<CodeprismConfig> {
    match path {
        Some(path) => {
            let mut config = CodeprismConfig::load(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Ok(CodeprismConfig::load_or_default()),
    }
}

pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}
