//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Evidence correlator: extract indicators from forensic evidence and build a scored timeline
#[derive(Parser, Debug)]
#[command(name = "evidence-correlator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Use this configuration file instead of the default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a case described by a manifest file
    Analyze {
        /// Case manifest (JSON)
        manifest: PathBuf,

        /// Static reputation list (JSON); may be repeated
        #[arg(short, long = "list")]
        lists: Vec<PathBuf>,

        /// Consult this SQLite verdict store
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Consult the verdict store in the data directory
        #[arg(long, conflicts_with = "store")]
        default_store: bool,

        /// Save obtained verdicts into the verdict store
        #[arg(long)]
        record: bool,

        /// Also write the report to a file (.json, .csv or .txt). CSV output
        /// adds a sibling `<name>.indicators.csv` with the scored indicators
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave the timeline out of text output
        #[arg(long)]
        no_timeline: bool,

        /// List clean and unknown indicators in text output
        #[arg(long)]
        all: bool,
    },

    /// Inspect the verdict store
    Store {
        /// Store location (defaults to the data directory)
        #[arg(short, long, global = true)]
        path: Option<PathBuf>,

        #[command(subcommand)]
        action: StoreAction,
    },

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show application information
    Info,
}

/// Verdict store subcommands.
#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// Show how many verdicts are stored per indicator kind
    Stats,

    /// Show the stored verdict for an indicator
    Get {
        /// Indicator kind (ip, domain, hash, path, registry, process)
        kind: String,
        /// Indicator value
        value: String,
    },

    /// Remove the stored verdict for an indicator
    Remove {
        /// Indicator kind (ip, domain, hash, path, registry, process)
        kind: String,
        /// Indicator value
        value: String,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print configuration file location
    Path,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
