//! manisync — incremental resource cache sync CLI.
//!
//! # Usage
//!
//! ```text
//! manisync sync <manifest-url> [--db PATH] [--timeout SECS] [--prune]
//! manisync diff <manifest-url> [--db PATH]
//! manisync status [--db PATH] [--json]
//! manisync generate <dir> [-o FILE]
//! ```
//!
//! `-v` / `-vv` raise log verbosity; `RUST_LOG` overrides both.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use commands::{diff::DiffArgs, generate::GenerateArgs, status::StatusArgs, sync::SyncArgs};
use manisync_sync::{config, SyncConfig};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "manisync",
    version,
    about = "Keep a local resource cache in sync with a remote manifest",
    long_about = None,
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch changed resources and update the local cache.
    Sync(SyncArgs),

    /// Show which resources a sync would fetch, without fetching them.
    Diff(DiffArgs),

    /// Show the cached manifest and resources.
    Status(StatusArgs),

    /// Write a manifest describing a directory tree.
    Generate(GenerateArgs),
}

// ---------------------------------------------------------------------------
// Shared store argument — resolves the config the commands run with
// ---------------------------------------------------------------------------

/// Location of the local cache database.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite cache database (default: ~/.manisync/cache.sqlite3).
    #[arg(long, env = "MANISYNC_DB", value_name = "PATH")]
    pub db: Option<PathBuf>,
}

impl StoreArgs {
    /// `~/.manisync/config.json` (or defaults) with `--db` applied on top.
    pub fn config(&self) -> Result<SyncConfig> {
        let Some(db) = self.db.clone() else {
            return config::load().context("failed to load ~/.manisync/config.json");
        };
        let mut config = match dirs::home_dir() {
            Some(home) => config::load_at(&home).context("failed to load config")?,
            None => SyncConfig::default(),
        };
        config.db_path = db;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Generate(args) => args.run(),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
