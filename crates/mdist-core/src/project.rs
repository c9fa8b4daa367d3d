//! Distribution and lock files on disk.
//!
//! A project is a distribution file (`matomo.toml`) plus its companion lock
//! (`matomo.lock.toml`) in the same directory. The lock is only ever
//! replaced whole, through a temporary file in the same directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use mdist_schema::{Distribution, LockFile};

use crate::error::{Error, Result};

/// A loaded distribution file and the location of its lock.
#[derive(Debug, Clone)]
pub struct Project {
    /// Path the distribution was read from.
    pub dist_path: PathBuf,
    /// Companion lock path; the file may not exist yet.
    pub lock_path: PathBuf,
    /// The parsed distribution.
    pub distribution: Distribution,
}

impl Project {
    /// Read and parse the distribution at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(Error::io(path))?;
        let distribution = Distribution::from_toml(&text)?;
        Ok(Self {
            dist_path: path.to_path_buf(),
            lock_path: lock_path_for(path),
            distribution,
        })
    }

    /// Directory holding the distribution file.
    pub fn dir(&self) -> &Path {
        self.dist_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// The existing lock, or `None` when none has been written yet.
    pub fn load_lock(&self) -> Result<Option<LockFile>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.lock_path).map_err(Error::io(&self.lock_path))?;
        Ok(Some(LockFile::from_toml(&text)?))
    }

    /// Atomically replace the lock file.
    pub fn save_lock(&self, lock: &LockFile) -> Result<()> {
        let text = lock.to_toml()?;
        let dir = self.dir();
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
        temp.write_all(text.as_bytes())
            .map_err(Error::io(temp.path()))?;
        temp.persist(&self.lock_path)
            .map_err(|e| Error::io(&self.lock_path)(e.error))?;
        tracing::debug!("Wrote {}", self.lock_path.display());
        Ok(())
    }

    /// Resolve the distribution's license credential.
    ///
    /// `$VAR` reads an environment variable, `<path` reads a file relative to
    /// the distribution's directory, anything else is literal. Empty results
    /// mean no credential.
    pub fn license(&self) -> Result<Option<String>> {
        self.license_with(|key| std::env::var(key).ok())
    }

    fn license_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Option<String>> {
        let Some(raw) = self.distribution.license_key.as_deref() else {
            return Ok(None);
        };
        let value = if let Some(var) = raw.strip_prefix('$') {
            let value = env(var);
            if value.is_none() {
                tracing::warn!("License variable ${var} is not set; continuing without a license");
            }
            value.unwrap_or_default()
        } else if let Some(file) = raw.strip_prefix('<') {
            let path = self.dir().join(file.trim());
            fs::read_to_string(&path).map_err(Error::io(&path))?
        } else {
            raw.to_string()
        };
        let value = value.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}

/// `<stem>.lock.toml` beside the distribution file.
pub fn lock_path_for(dist_path: &Path) -> PathBuf {
    let stem = dist_path
        .file_stem()
        .map_or_else(|| "distribution".into(), |s| s.to_string_lossy().into_owned());
    dist_path.with_file_name(format!("{stem}.lock.toml"))
}
