//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
mod common;
pub mod tools;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use muli::config::Config;

#[derive(Parser)]
#[command(name = "muli")]
#[command(version)]
#[command(about = "Conversational agent with a sandboxed container shell", long_about = None)]
struct Cli {
    /// Path to config.json (defaults to ~/.muli/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive agent mode
    Agent {
        /// Direct message to process (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
    },
    /// List registered tools
    Tools,
    /// Relay worker started by expose_container_port
    #[command(hide = true)]
    Relay {
        /// Host port to listen on
        #[arg(long)]
        listen_port: u16,
        /// Target address, HOST:PORT
        #[arg(long)]
        target: String,
    },
    /// Show version information
    Version,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // The relay child logs with defaults; it has no config of its own.
    if let Some(Commands::Relay {
        listen_port,
        target,
    }) = &cli.command
    {
        muli::utils::logging::init_logging(&Default::default())?;
        muli::relay::run(*listen_port, target)
            .await
            .with_context(|| format!("relay on port {} failed", listen_port))?;
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    muli::utils::logging::init_logging(&config.logging)
        .with_context(|| "Failed to initialize logging")?;

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Agent { message }) => {
            agent::cmd_agent(config, message).await?;
        }
        Some(Commands::Tools) => {
            tools::cmd_tools(config).await?;
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Relay { .. }) => {}
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Config::load().with_context(|| "Failed to load configuration"),
    }
}

/// Display version information
fn cmd_version() {
    println!("muli {}", env!("CARGO_PKG_VERSION"));
}
