//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::postmortem::Severity;
use crate::rules::RuleSpec;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Interface to bind (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Projects command arguments.
#[derive(Debug, Args)]
pub struct ProjectsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Rule file commands.
#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// List the rule files of a project
    List {
        /// Project directory
        project: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Render a rule file and print it
    Generate(GenerateArgs),
}

/// Arguments of `rules generate`.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Rule name, used as the file name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Description shown to the assistant
    #[arg(short, long)]
    pub description: Option<String>,

    /// File glob the rule applies to (repeatable)
    #[arg(short, long = "glob", value_name = "GLOB")]
    pub globs: Vec<String>,

    /// Apply the rule to every request
    #[arg(long)]
    pub always_apply: bool,

    /// File the assistant must read first (repeatable)
    #[arg(short, long = "must-read", value_name = "FILE")]
    pub must_read: Vec<String>,

    /// Instructions for the assistant
    #[arg(short, long)]
    pub instructions: Option<String>,

    /// Write the rule into this project instead of printing it
    #[arg(short, long, value_name = "PROJECT")]
    pub write: Option<PathBuf>,
}

impl From<&GenerateArgs> for RuleSpec {
    fn from(args: &GenerateArgs) -> Self {
        Self {
            name: args.name.clone(),
            description: args.description.clone(),
            globs: args.globs.clone(),
            always_apply: args.always_apply,
            must_read_files: args.must_read.clone(),
            instructions: args.instructions.clone(),
        }
    }
}

/// Global rules commands.
#[derive(Debug, Subcommand)]
pub enum GlobalCommand {
    /// Print the global rules
    Show,

    /// Print the path of the global rules file
    Path,
}

/// Scan path commands.
#[derive(Debug, Subcommand)]
pub enum ScanPathsCommand {
    /// List scan paths
    List,

    /// Add a scan path
    Add {
        /// Directory whose children are projects
        dir: PathBuf,
    },

    /// Remove a scan path
    Remove {
        /// Directory to stop scanning
        dir: PathBuf,
    },
}

/// API key commands.
#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    /// Store an API key, encrypted for this user and machine
    Set {
        /// The API key
        key: String,
    },

    /// Remove the stored API key
    Clear,

    /// Show whether a key is stored
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Postmortem commands.
#[derive(Debug, Subcommand)]
pub enum PostmortemCommand {
    /// Record a postmortem
    Add(AddPostmortemArgs),

    /// List postmortems of a project, newest first
    List {
        /// Project directory
        project: PathBuf,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show one postmortem
    Show {
        /// Postmortem id
        id: i64,
    },

    /// Delete a postmortem
    Delete {
        /// Postmortem id
        id: i64,
    },

    /// Ask the model for rules that would have prevented a postmortem
    Analyze {
        /// Postmortem id
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Ask the model for rules covering recurring problems in a project
    Patterns {
        /// Project directory
        project: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show postmortem database statistics
    Stats,
}

/// Arguments of `postmortem add`.
#[derive(Debug, Args)]
pub struct AddPostmortemArgs {
    /// Project directory
    pub project: PathBuf,

    /// What went wrong, in your own words
    #[arg(short, long)]
    pub notes: String,

    /// Short title
    #[arg(short, long)]
    pub title: Option<String>,

    /// What the assistant did
    #[arg(long)]
    pub what_happened: Option<String>,

    /// What should have happened
    #[arg(long)]
    pub expected: Option<String>,

    /// How bad it was
    #[arg(short, long, value_enum)]
    pub severity: Option<SeverityArg>,

    /// File involved (repeatable)
    #[arg(short, long = "file", value_name = "FILE")]
    pub files: Vec<String>,
}

/// Rule review command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Rule file to review
    pub file: PathBuf,

    /// Project the rule belongs to (adds its rules as context)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

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

/// Severity argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityArg {
    /// Minor annoyance
    Low,
    /// Wasted time
    Medium,
    /// Broke something
    High,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => Self::Low,
            SeverityArg::Medium => Self::Medium,
            SeverityArg::High => Self::High,
        }
    }
}
