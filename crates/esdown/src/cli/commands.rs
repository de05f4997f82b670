//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Build command arguments.
#[derive(Debug, Args)]
pub struct BuildCommand {
    /// Recompile everything, ignoring the compile cache
    #[arg(short, long)]
    pub force: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Skip the full build normally done before watching
    #[arg(long)]
    pub skip_initial: bool,
}

/// Clean command arguments.
#[derive(Debug, Args)]
pub struct CleanCommand {
    /// Keep the compile cache
    #[arg(long)]
    pub keep_cache: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
