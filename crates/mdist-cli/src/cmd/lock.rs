//! `mdist lock`

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use mdist_core::Synchronizer;
use tracing::info;

use super::{Environment, Remotes, load_project};
use crate::ui::ConsoleReporter;

pub fn lock(env: &Environment, distribution: &Path, update: bool) -> Result<ExitCode> {
    let project = load_project(distribution)?;
    let previous = project.load_lock()?;
    let license = project.license()?;

    let remotes = Remotes::new(&env.settings)?;
    let reporter = ConsoleReporter::new(env.quiet);
    let prior = if update { None } else { previous.as_ref() };
    let lock = Synchronizer::new(remotes.sources(), &env.cache, &reporter)
        .with_license(license.as_deref())
        .synchronize(&project.distribution, prior)?;

    match &previous {
        Some(previous) if *previous == lock => println!("lock is up to date"),
        Some(previous) => {
            for change in lock.changes_since(previous) {
                println!("{change}");
            }
        }
        None => println!(
            "locked core {} and {} plugin(s)",
            lock.core.version,
            lock.plugins.len()
        ),
    }

    project
        .save_lock(&lock)
        .with_context(|| format!("Failed to write {}", project.lock_path.display()))?;
    info!("Wrote {}", project.lock_path.display());
    Ok(ExitCode::SUCCESS)
}
