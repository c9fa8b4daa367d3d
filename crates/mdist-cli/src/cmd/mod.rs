//! Subcommand implementations.

pub mod build;
pub mod check;
pub mod lock;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use mdist_core::index::GitCli;
use mdist_core::index::http::HttpIndex;
use mdist_core::signature::GpgVerifier;
use mdist_core::{CacheStore, Project, Settings, Sources};

use crate::{Cli, Commands};

/// Settings, cache and output mode shared by every subcommand.
#[derive(Debug)]
pub struct Environment {
    pub settings: Settings,
    pub cache: CacheStore,
    pub quiet: bool,
}

impl Environment {
    /// Read settings from the environment and apply the cache flags.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut settings = Settings::from_env().context("Invalid environment")?;
        if cli.no_cache {
            settings.cache_dir = None;
        } else if let Some(dir) = &cli.cache_dir {
            settings.cache_dir = Some(dir.clone());
        }
        let cache = CacheStore::from_dir(settings.cache_dir.clone());
        if cli.clear_cache {
            tracing::info!("Clearing artifact cache");
            cache.clear().context("Failed to clear the cache")?;
        }
        Ok(Self {
            settings,
            cache,
            quiet: cli.quiet,
        })
    }
}

/// The live network boundaries.
pub(crate) struct Remotes {
    http: HttpIndex,
    git: GitCli,
}

impl Remotes {
    pub(crate) fn new(settings: &Settings) -> Result<Self> {
        let http = HttpIndex::new(settings, Box::new(GpgVerifier::default()))
            .context("Failed to set up the HTTP client")?;
        Ok(Self {
            http,
            git: GitCli::default(),
        })
    }

    pub(crate) fn sources(&self) -> Sources<'_> {
        Sources {
            core: &self.http,
            plugins: &self.http,
            git: &self.git,
            raw: &self.http,
        }
    }
}

pub(crate) fn load_project(path: &Path) -> Result<Project> {
    Project::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Dispatch the parsed command line.
pub fn run(cli: &Cli) -> Result<ExitCode> {
    let env = Environment::from_cli(cli)?;
    match &cli.command {
        Commands::Lock {
            distribution,
            update,
        } => lock::lock(&env, distribution, *update),
        Commands::Build {
            distribution,
            output,
            relock,
            keep_staging,
        } => build::build(&env, distribution, output, *relock, keep_staging.as_deref()),
        Commands::Check { distribution } => check::check(distribution),
    }
}
