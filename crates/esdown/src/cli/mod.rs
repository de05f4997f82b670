//! Command-line interface for esdown.
//!
//! This module provides the CLI structure for the `esdown` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{BuildCommand, CleanCommand, ConfigCommand, StatusCommand, WatchCommand};

/// esdown - EcmaScript 6 assets compiled as you save
///
/// Compiles EcmaScript 6 script assets to EcmaScript 5 with Traceur, either
/// as a one-shot build or continuously while watching the source trees.
#[derive(Debug, Parser)]
#[command(name = "esdown")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Project directory to operate on
    #[arg(short, long, global = true, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile all script assets once
    Build(BuildCommand),

    /// Compile assets continuously as they change
    Watch(WatchCommand),

    /// Delete compiled outputs
    Clean(CleanCommand),

    /// Show project and cache status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
