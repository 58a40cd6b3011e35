//! # Reminder CLI (`reminder`)
//!
//! ## Usage
//!
//! ```bash
//! reminder --config ./config/reminder.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reminder serve` | Start the HTTP API, the daily rotator and (if needed) background indexing |
//! | `reminder index` | Index the corpora and write the snapshot; resumes from the checkpoint |
//! | `reminder export <path>` | Write the working index to a snapshot file |
//! | `reminder import <path>` | Validate a snapshot and make it the working index |
//! | `reminder search "<question>"` | Answer one question from the index |
//! | `reminder daily` | Run one rotation tick and print the reminder |
//!
//! Logging is controlled with `RUST_LOG` (default `info`) and goes to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use reminder::commands;
use reminder::config::{load_config, Config};
use reminder::progress::ProgressMode;

/// Quran, Hadith and Names search with LLM answers and a daily reminder.
#[derive(Parser)]
#[command(name = "reminder", version)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Index the corpora into a snapshot.
    ///
    /// Resumes from the checkpoint left by an interrupted run.
    Index {
        /// Ignore the checkpoint and any existing snapshot; rebuild from scratch.
        #[arg(long)]
        fresh: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Export the working index to a snapshot file.
    Export { path: PathBuf },

    /// Import a snapshot file as the working index.
    Import { path: PathBuf },

    /// Answer a question from the index.
    Search { question: String },

    /// Publish one daily reminder and print it.
    Daily,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::minimal(),
    };

    match cli.command {
        Commands::Serve => commands::run_serve(config).await,
        Commands::Index { fresh, progress } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_index(config, fresh, progress).await
        }
        Commands::Export { path } => commands::run_export(config, &path).await,
        Commands::Import { path } => commands::run_import(config, &path).await,
        Commands::Search { question } => commands::run_search(config, &question).await,
        Commands::Daily => commands::run_daily(config).await,
    }
}
