//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod mcp;
pub mod sessions;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version)]
#[command(about = "Agent orchestration runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and call MCP servers
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
    /// Manage persisted sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum McpAction {
    /// Connect servers and list the tools they expose
    Tools {
        /// MCP server file (`{"mcpServers": {...}}`); defaults to the main config
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only this server
        #[arg(long)]
        server: Option<String>,
    },
    /// Call one tool on one server
    Call {
        server: String,
        tool: String,
        /// Tool input as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Connect servers and list their resources and prompts
    Resources {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        server: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List stored sessions, newest first
    List,
    /// Print a stored conversation
    Show {
        id: String,
        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored session
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (credentials redacted)
    Show,
    /// Validate the config file
    Check,
}

/// Entry point for the CLI - called from main().
pub async fn run() -> Result<()> {
    // Fall back to defaults if the config file is missing or unreadable so
    // `config check` can still report what is wrong with it.
    let logging_cfg = conductor::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    conductor::utils::logging::init_logging(&logging_cfg);

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            println!("conductor {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Mcp { action }) => {
            mcp::cmd_mcp(action).await?;
        }
        Some(Commands::Sessions { action }) => {
            sessions::cmd_sessions(action).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }

    Ok(())
}
