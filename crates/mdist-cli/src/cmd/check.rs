//! `mdist check`

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use tracing::{info, warn};

use super::load_project;
use crate::EXIT_STALE;

pub fn check(distribution: &Path) -> Result<ExitCode> {
    let project = load_project(distribution)?;
    let fingerprint = project.distribution.fingerprint();
    match project.load_lock()? {
        Some(lock) if lock.is_fresh(&fingerprint) => {
            info!("{} is up to date", project.lock_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Some(lock) => {
            warn!(
                "{} is stale (distribution {fingerprint}, lock {})",
                project.lock_path.display(),
                lock.distribution_fingerprint
            );
            Ok(ExitCode::from(EXIT_STALE))
        }
        None => {
            warn!("{} does not exist", project.lock_path.display());
            Ok(ExitCode::from(EXIT_STALE))
        }
    }
}
