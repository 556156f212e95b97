//! # Campus Guide CLI (`guide`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `guide init` | Create the SQLite database and run schema migrations |
//! | `guide seed <file>` | Load knowledge passages and events from a TOML file |
//! | `guide ask "<message>"` | Answer a message with context, intent and route |
//! | `guide intent "<message>"` | Show how a message is classified |
//! | `guide route <from> <to>` | Print the shortest walking route |
//! | `guide resolve "<text>"` | Show which location a piece of text names |
//!
//! ## Examples
//!
//! ```bash
//! guide init --config ./config/guide.toml
//! guide seed ./data/campus-knowledge.toml
//! guide ask "¿cómo llego a la biblioteca?" --scene 0-entrada
//! guide route entrada polideportivo
//! ```
//!
//! Logs go to stderr. The level is taken from `RUST_LOG`, falling back to
//! `info` (or `debug` with `--verbose`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use campus_guide::{ask, config, migrate, navigate, seed};

#[derive(Parser)]
#[command(
    name = "guide",
    about = "Campus tour assistant: intents, walking routes and grounded answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/guide.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Upsert knowledge passages and events from a TOML seed file.
    ///
    /// Passages are embedded when an embedding provider is configured and
    /// their content changed since the last seed.
    Seed {
        /// Seed file path.
        file: PathBuf,
    },

    /// Answer a visitor message.
    Ask {
        message: String,

        /// Node key of the scene the visitor is standing in.
        #[arg(long)]
        scene: Option<String>,

        /// Conversation to read history from and append to.
        #[arg(long)]
        conversation: Option<i64>,

        /// Print the full reply as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Classify a message without answering it.
    Intent { message: String },

    /// Shortest route between two locations, by node key or name.
    Route { from: String, to: String },

    /// Resolve free text to a campus location.
    Resolve { text: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The configured graph settings, or the built-in campus when no config
/// file exists. A config file that exists but fails to load is an error.
fn graph_config(path: &Path) -> anyhow::Result<config::Config> {
    if !path.exists() {
        return Ok(config::Config::minimal());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that only need the graph or the classifier
    match &cli.command {
        Commands::Intent { message } => return navigate::run_intent(message),
        Commands::Route { from, to } => {
            return navigate::run_route(&graph_config(&cli.config)?, from, to);
        }
        Commands::Resolve { text } => {
            return navigate::run_resolve(&graph_config(&cli.config)?, text);
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { file } => {
            seed::run_seed(&cfg, &file).await?;
        }
        Commands::Ask {
            message,
            scene,
            conversation,
            json,
        } => {
            ask::run_ask(&cfg, &message, scene, conversation, json).await?;
        }
        Commands::Intent { .. } | Commands::Route { .. } | Commands::Resolve { .. } => {}
    }

    Ok(())
}
