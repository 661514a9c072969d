//! bpm-sorter - sort a Spotify playlist by tempo.
//!
//! The user taps along with every track of a playlist, the tapped tempos
//! are kept in a local cache, and the playlist is rewritten slowest first.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod prompt;
pub mod reorder;
pub mod session;
pub mod spotify;
pub mod tempo;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr and stay quiet by default so they don't interleave
    // with the prompts
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bpm_sorter=warn")))
        .init();

    cli::run_command(&args)
}
