//! Command-line interface for bpm-sorter.
//!
//! Running without a subcommand starts the interactive sort session;
//! `cache` lists what has been tapped so far.

mod commands;

pub use commands::{Cli, Commands, run_command};
