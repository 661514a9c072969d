//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `sort`: The interactive tap-and-sort session (default)
//! - `login`: Spotify login and token reuse
//! - `cache`: Inspecting the tempo cache
//! - `restore`: Recovering tracks a failed reorder took out of a playlist

mod cache;
mod login;
mod restore;
mod sort;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config;
use crate::error::Error;

pub use cache::cmd_cache;
pub use restore::cmd_restore;
pub use sort::cmd_sort;

/// Tap out the tempo of every track in a Spotify playlist, then sort it by BPM.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// List the cached tempos, slowest first
    Cache,
    /// Put back tracks a failed reorder took out of a playlist
    Restore,
}

/// Run the specified CLI command; no command starts a sort session.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = config::load();
    config.validate().map_err(Error::config)?;

    let rt = Runtime::new()?;
    let result = match &cli.command {
        Some(Commands::Cache) => cmd_cache(&config),
        Some(Commands::Restore) => cmd_restore(&rt, &config),
        None => {
            if let Err(e) = config::ensure_exists() {
                tracing::warn!("Could not write default config: {}", e);
            }
            cmd_sort(&rt, &config)
        }
    };

    // The console reader may still be parked on stdin; don't wait for it
    rt.shutdown_background();
    result
}
