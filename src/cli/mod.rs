//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod sessions;
pub mod tools;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use xiaoclaw::config::Config;

#[derive(Parser)]
#[command(name = "xiaoclaw")]
#[command(version)]
#[command(about = "Lightweight conversational agent runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (one-shot with -m, interactive otherwise)
    Chat {
        /// Message to send (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
        /// Session id to continue
        #[arg(long, default_value = chat::DEFAULT_SESSION)]
        session: String,
        /// Wait for the full answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// List available tools
    Tools,
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List sessions, most recent first
    List,
    /// Delete a session
    Delete {
        /// Session id
        id: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().with_context(|| format!("Failed to load {:?}", Config::path()))?;
    if let Err(e) = xiaoclaw::utils::logging::init_logging(&config.logging) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Chat {
            message,
            session,
            no_stream,
        }) => {
            chat::cmd_chat(config, message, session, no_stream).await?;
        }
        Some(Commands::Sessions { action }) => {
            sessions::cmd_sessions(&config, action).await?;
        }
        Some(Commands::Tools) => {
            tools::cmd_tools(&config);
        }
        Some(Commands::Version) => {
            println!("xiaoclaw {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
