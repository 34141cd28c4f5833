//! Command-line interface for rulekeeper.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddPostmortemArgs, CheckCommand, ConfigCommand, GenerateArgs, GlobalCommand, KeyCommand,
    PostmortemCommand, ProjectsCommand, RulesCommand, ScanPathsCommand, ServeCommand,
    SeverityArg,
};

/// rulekeeper - Manage AI coding assistant rules across your projects
///
/// Serves a local web API for editing global and per-project rule files,
/// and turns postmortems of assistant mistakes into rule suggestions.
#[derive(Debug, Parser)]
#[command(name = "rulekeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

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
    /// Run the REST API server
    Serve(ServeCommand),

    /// List projects found under the scan paths
    Projects(ProjectsCommand),

    /// Inspect or generate rule files
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Inspect the global rules
    #[command(subcommand)]
    Global(GlobalCommand),

    /// Manage scan paths
    #[command(subcommand)]
    ScanPaths(ScanPathsCommand),

    /// Manage the stored API key
    #[command(subcommand)]
    Key(KeyCommand),

    /// Record and analyze postmortems
    #[command(subcommand)]
    Postmortem(PostmortemCommand),

    /// Ask the model to review a rule file
    Check(CheckCommand),

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
