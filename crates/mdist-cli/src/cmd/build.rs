//! `mdist build`

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use mdist_core::{BuildOptions, ReleaseBuilder, Synchronizer};
use tracing::info;

use super::{Environment, Remotes, load_project};
use crate::ui::ConsoleReporter;

pub fn build(
    env: &Environment,
    distribution: &Path,
    output: &Path,
    relock: bool,
    keep_staging: Option<&Path>,
) -> Result<ExitCode> {
    let project = load_project(distribution)?;
    let license = project.license()?;
    let remotes = Remotes::new(&env.settings)?;
    let reporter = ConsoleReporter::new(env.quiet);

    let fingerprint = project.distribution.fingerprint();
    let lock = match project.load_lock()? {
        Some(lock) if lock.is_fresh(&fingerprint) || !relock => lock,
        previous => {
            if !relock {
                bail!(
                    "{} does not exist; run `mdist lock` or pass --relock",
                    project.lock_path.display()
                );
            }
            info!("Re-locking {}", project.dist_path.display());
            let lock = Synchronizer::new(remotes.sources(), &env.cache, &reporter)
                .with_license(license.as_deref())
                .synchronize(&project.distribution, previous.as_ref())?;
            project
                .save_lock(&lock)
                .with_context(|| format!("Failed to write {}", project.lock_path.display()))?;
            lock
        }
    };

    let options = BuildOptions {
        output: output.to_path_buf(),
        keep_staging: keep_staging.map(Path::to_path_buf),
        source_date_epoch: env.settings.source_date_epoch,
    };
    let built = ReleaseBuilder::new(remotes.sources(), &env.cache, &reporter)
        .with_license(license.as_deref())
        .build(&project.distribution, &lock, &options)?;

    info!(
        "Removed {} file(s), mtimes clamped to {}",
        built.removed_files, built.mtime_clamp
    );
    println!("{}", built.path.display());
    println!("sha256 {}", built.sha256);
    Ok(ExitCode::SUCCESS)
}
