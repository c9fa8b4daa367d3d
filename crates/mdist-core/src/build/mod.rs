//! Release building
//!
//! Stages the locked core and plugins into a fresh directory, runs the
//! customisation operations over it, records `.build.json` and packages the
//! tree. The lock must match the distribution it is built for.

pub mod context;
pub mod manifest;
pub mod package;
mod stage;

use std::fs;
use std::path::{Path, PathBuf};

use mdist_schema::{Distribution, HashAlgorithm, LockFile};

use crate::cache::CacheStore;
use crate::customise;
use crate::error::{Error, Result};
use crate::reporter::Reporter;
use crate::sync::Sources;
use context::{BuildContext, MtimeClamp};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Requested output path; see [`package::Compression::for_output`].
    pub output: PathBuf,
    /// Stage into this directory and keep it, instead of a temporary one.
    pub keep_staging: Option<PathBuf>,
    /// Explicit mtime clamp.
    pub source_date_epoch: Option<i64>,
}

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub path: PathBuf,
    pub sha256: String,
    pub mtime_clamp: i64,
    pub removed_files: usize,
}

pub struct ReleaseBuilder<'a> {
    sources: Sources<'a>,
    cache: &'a CacheStore,
    reporter: &'a dyn Reporter,
    license: Option<&'a str>,
}

impl<'a> ReleaseBuilder<'a> {
    pub fn new(sources: Sources<'a>, cache: &'a CacheStore, reporter: &'a dyn Reporter) -> Self {
        Self {
            sources,
            cache,
            reporter,
            license: None,
        }
    }

    pub fn with_license(mut self, license: Option<&'a str>) -> Self {
        self.license = license;
        self
    }

    /// Build the release for `dist` from `lock`.
    ///
    /// Refuses with [`Error::StaleLock`] when the lock was produced from
    /// different distribution inputs.
    pub fn build(&self, dist: &Distribution, lock: &LockFile, options: &BuildOptions) -> Result<BuildOutput> {
        let fingerprint = dist.fingerprint();
        if !lock.is_fresh(&fingerprint) {
            return Err(Error::StaleLock {
                expected: fingerprint,
                found: lock.distribution_fingerprint.clone(),
            });
        }

        let temp;
        let root = match &options.keep_staging {
            Some(dir) => prepare_staging(dir)?,
            None => {
                temp = tempfile::Builder::new()
                    .prefix("mdist-")
                    .tempdir()
                    .map_err(Error::io(std::env::temp_dir()))?;
                temp.path().to_path_buf()
            }
        };

        let build_start = chrono::Utc::now().timestamp();
        let clamp = MtimeClamp::new(options.source_date_epoch, build_start);
        let mut ctx = BuildContext::new(&root, lock.clone(), clamp);

        self.reporter.phase("Staging");
        self.stage_core(&mut ctx)?;
        self.stage_plugins(&mut ctx)?;

        self.reporter.phase("Customising");
        customise::apply(&dist.customisation, &mut ctx, self.reporter)?;

        manifest::write_build_manifest(&ctx, &dist.customisation)?;

        self.reporter.phase("Packaging");
        let path = package::package(ctx.root(), &options.output, ctx.clamp.value())?;
        let data = fs::read(&path).map_err(Error::io(&path))?;

        Ok(BuildOutput {
            sha256: HashAlgorithm::Sha256.digest(&data),
            path,
            mtime_clamp: ctx.clamp.value(),
            removed_files: ctx.removed_files().len(),
        })
    }
}

/// Create `dir` for staging; an existing directory must be empty.
fn prepare_staging(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(Error::io(dir))?;
    let mut entries = fs::read_dir(dir).map_err(Error::io(dir))?;
    if entries.next().is_some() {
        return Err(Error::io(dir)(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "staging directory is not empty",
        )));
    }
    Ok(dir.to_path_buf())
}
