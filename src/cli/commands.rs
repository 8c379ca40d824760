//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - plan: print balanced combinations for a pools file
//! - run: plan, build and execute a batch file
//! - stats: print a host resource snapshot

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Batchmix - balanced media batch planning and execution
#[derive(Parser, Debug)]
#[command(name = "batchmix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan combinations over the pools in a YAML file and print them as JSON
    Plan {
        /// YAML list of pools (each with `name` and `files`)
        #[arg(short, long)]
        pools: PathBuf,

        /// Number of combinations to generate
        #[arg(short = 'n', long)]
        count: usize,

        /// Pool indices to sort by, most significant first
        #[arg(short, long, value_delimiter = ',')]
        sort: Vec<usize>,

        /// Sort descending instead of ascending
        #[arg(short, long)]
        descending: bool,
    },

    /// Execute every job of a batch file
    Run {
        /// Batch definition (YAML)
        batch: PathBuf,

        /// Override max concurrent tasks
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Override threads per task
        #[arg(short, long)]
        threads: Option<u32>,
    },

    /// Show host CPU and memory usage
    Stats,
}
