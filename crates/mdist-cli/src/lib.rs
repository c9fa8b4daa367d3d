//! mdist - reproducible Matomo distribution builder
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Locks a distribution file (core version, plugins, customisations) to
//! exact artifacts and builds a byte-for-byte reproducible release archive
//! from that lock.
//!
//! # Files
//!
//! ```text
//! site/
//! ├── matomo.toml        # distribution: what to build
//! └── matomo.lock.toml   # lock: exactly which artifacts
//! ```

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit status when the lock is missing or does not match the distribution.
pub const EXIT_STALE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "mdist")]
#[command(author, version, about = "mdist - reproducible Matomo distribution builder")]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory for downloaded artifacts
    #[arg(long, global = true, env = "MDIST_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Do not read or write the artifact cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Empty the artifact cache before running
    #[arg(long, global = true)]
    pub clear_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the distribution and write its lock file
    Lock {
        /// Distribution file
        distribution: PathBuf,
        /// Ignore the previous lock and resolve everything again
        #[arg(long)]
        update: bool,
    },
    /// Build a release archive from the lock
    Build {
        /// Distribution file
        distribution: PathBuf,
        /// Output archive (.tar, .tar.gz, .tgz or .tar.zst)
        #[arg(short, long)]
        output: PathBuf,
        /// Re-lock first if the lock is stale or missing
        #[arg(long)]
        relock: bool,
        /// Stage into this directory and keep it afterwards
        #[arg(long)]
        keep_staging: Option<PathBuf>,
    },
    /// Check that the lock exists and matches the distribution
    Check {
        /// Distribution file
        distribution: PathBuf,
    },
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "mdist=debug,mdist_core=debug,mdist_cli=debug"
        } else if self.quiet {
            "mdist=warn,mdist_core=warn,mdist_cli=warn"
        } else {
            "mdist=info,mdist_core=info,mdist_cli=info"
        }
    }
}
