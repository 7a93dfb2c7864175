//! suportectl - console client for the support assistant engine.
//!
//! Drives the engine library from the terminal: classify a problem
//! description, chat with the local model, run a remediation tool, repair
//! a locked spreadsheet, or watch file-server connectivity.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use suporte_common::{Config, Session};

#[derive(Parser)]
#[command(name = "suportectl")]
#[command(about = "Assistente de suporte de TI - console", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "suporte.toml")]
    config: PathBuf,

    /// Use a local development session instead of the signed-in user
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a problem description into a remediation tool
    Classify {
        /// Free-text problem description
        text: String,

        /// Run the matched tool immediately
        #[arg(long)]
        run: bool,
    },

    /// One conversational turn with the assistant
    Chat {
        /// Message for the assistant
        message: String,
    },

    /// Run a remediation tool by name
    Run {
        /// Tool name: reconnect-network, clear-cache, repair-office, planilha
        tool: String,

        /// Target file, for tools that act on one
        #[arg(long)]
        target: Option<PathBuf>,
    },

    /// Unlock and repair a spreadsheet
    Repair {
        /// Spreadsheet to repair (.xlsx, .xls, .xlsm)
        file: PathBuf,
    },

    /// Show model and file-server status
    Status,

    /// Watch file-server connectivity continuously
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    tracing::debug!("Configuration loaded from {}", cli.config.display());
    let session = if cli.dev {
        Session::dev()
    } else {
        Session::anonymous()
    };

    match cli.command {
        Commands::Classify { text, run } => commands::classify(&config, &text, run).await,
        Commands::Chat { message } => commands::chat(&config, &session, &message).await,
        Commands::Run { tool, target } => commands::run(&config, &tool, target.as_deref()).await,
        Commands::Repair { file } => commands::repair(&config, &file).await,
        Commands::Status => commands::status(&config).await,
        Commands::Watch => commands::watch(&config).await,
    }
}
