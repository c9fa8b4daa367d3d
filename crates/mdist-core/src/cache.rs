//! Hash-verified blob cache
//!
//! Each entry is a pair of files in the cache directory: `<key>.dat` holds the
//! blob and `<key>.dat.check` holds `algorithm:hex` lines describing it.
//! Entries are only ever returned after re-hashing the blob on disk; anything
//! inconsistent is evicted.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mdist_schema::{CacheKey, DigestSet};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Blob cache rooted at an optional directory. Without a directory the cache
/// is disabled: `store` only hashes, `retrieve` always misses.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Option<PathBuf>,
}

impl CacheStore {
    /// Create a cache at `root`. The directory is created on first store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A cache that never holds anything.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// Create from an optional directory.
    pub fn from_dir(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Path of the blob file for `key`.
    pub fn blob_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{key}.dat")))
    }

    /// Path of the sidecar file for `key`.
    pub fn check_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{key}.dat.check")))
    }

    /// Store `data` under `key` and return its digest set.
    ///
    /// Both files are written through a temporary file and renamed into
    /// place, blob first, so a reader never sees a sidecar without its blob.
    pub fn store(&self, key: &CacheKey, data: &[u8]) -> Result<DigestSet, CacheError> {
        let digests = DigestSet::compute(data);
        let (Some(root), Some(blob), Some(check)) =
            (self.root.as_deref(), self.blob_path(key), self.check_path(key))
        else {
            return Ok(digests);
        };

        fs::create_dir_all(root).map_err(io_err(root))?;
        write_atomic(root, &blob, data)?;
        write_atomic(root, &check, digests.to_sidecar().as_bytes())?;
        tracing::debug!("Cached {key} ({} bytes)", data.len());
        Ok(digests)
    }

    /// Fetch the blob for `key` if it is present and verifiably matches
    /// `expected`.
    ///
    /// The sidecar must share a digest with `expected`, and re-hashing the
    /// blob with that algorithm must reproduce it. Otherwise both files are
    /// removed and `None` is returned.
    pub fn retrieve(
        &self,
        key: &CacheKey,
        expected: &DigestSet,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let (Some(blob), Some(check)) = (self.blob_path(key), self.check_path(key)) else {
            return Ok(None);
        };

        if !blob.exists() && !check.exists() {
            tracing::trace!("Cache miss for {key}");
            return Ok(None);
        }

        let Ok(sidecar) = fs::read_to_string(&check) else {
            tracing::warn!("Cache entry {key} has no readable sidecar, evicting");
            self.evict(key)?;
            return Ok(None);
        };

        let Some(alg) = DigestSet::from_sidecar(&sidecar).first_match(expected) else {
            tracing::debug!("Cache entry {key} does not match the expected digests, evicting");
            self.evict(key)?;
            return Ok(None);
        };

        let data = match fs::read(&blob) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Cache entry {key} lost its blob, evicting");
                self.evict(key)?;
                return Ok(None);
            }
            Err(e) => return Err(io_err(&blob)(e)),
        };

        if expected.get(alg) != Some(alg.digest(&data).as_str()) {
            tracing::warn!("Cache entry {key} is corrupt ({alg} mismatch), evicting");
            self.evict(key)?;
            return Ok(None);
        }

        tracing::debug!("Cache hit for {key}");
        Ok(Some(data))
    }

    /// Remove both files of an entry. Missing files are not an error.
    pub fn evict(&self, key: &CacheKey) -> Result<(), CacheError> {
        for path in [self.blob_path(key), self.check_path(key)].into_iter().flatten() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Ok(())
    }

    /// Delete the whole cache directory.
    pub fn clear(&self) -> Result<(), CacheError> {
        let Some(root) = self.root.as_deref() else {
            return Ok(());
        };
        match fs::remove_dir_all(root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(root)(e)),
        }
    }
}

fn write_atomic(dir: &Path, dest: &Path, data: &[u8]) -> Result<(), CacheError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(data).map_err(io_err(tmp.path()))?;
    tmp.persist(dest).map_err(|e| io_err(dest)(e.error))?;
    Ok(())
}
