//! Persona CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a default config to ~/.persona/config.toml
//! - `prompt`  — Assemble and print a layered prompt (no provider call)
//! - `chat`    — Talk to a character, single-message or interactive
//! - `doctor`  — Diagnose configuration and provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "persona",
    about = "Persona — layered prompt cache for roleplay characters",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Assemble a prompt and print its layers
    Prompt {
        /// JSON file holding an array of characters
        #[arg(long)]
        characters: PathBuf,

        /// Character ID to assemble for
        #[arg(long)]
        character: String,

        /// User ID
        #[arg(long)]
        user: String,

        /// JSON file holding an array of scenarios
        #[arg(long)]
        scenarios: Option<PathBuf>,

        /// Scenario ID
        #[arg(long)]
        scenario: Option<String>,

        /// The current user message
        #[arg(short, long)]
        message: String,
    },

    /// Chat with a character
    Chat {
        /// JSON file holding an array of characters
        #[arg(long)]
        characters: PathBuf,

        /// Character ID to talk to
        #[arg(long)]
        character: String,

        /// User ID
        #[arg(long, default_value = "local-user")]
        user: String,

        /// JSON file holding an array of scenarios
        #[arg(long)]
        scenarios: Option<PathBuf>,

        /// Scenario ID
        #[arg(long)]
        scenario: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Prompt {
            characters,
            character,
            user,
            scenarios,
            scenario,
            message,
        } => {
            let target = commands::Target {
                characters,
                scenarios,
                character,
                user,
                scenario,
            };
            commands::prompt::run(target, message).await?
        }
        Commands::Chat {
            characters,
            character,
            user,
            scenarios,
            scenario,
            message,
        } => {
            let target = commands::Target {
                characters,
                scenarios,
                character,
                user,
                scenario,
            };
            commands::chat::run(target, message).await?
        }
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
