//! Pipeline-level error type
//!
//! Module errors convert into [`Error`] at the point where the artifact they
//! concern is known, so that every failure names what was being attempted.

use std::path::PathBuf;

use mdist_schema::{CacheKeyError, DigestSet};
use mdist_schema::distribution::DistributionError;
use mdist_schema::lock::LockFileError;
use thiserror::Error;

use crate::build::package::PackageError;
use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::customise::CustomiseError;
use crate::customise::order::OrderError;
use crate::index::{GitError, IndexError};
use crate::io::extract::ExtractError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No version of {artifact} satisfies '{constraint}'")]
    NoMatchingVersion { artifact: String, constraint: String },

    #[error("{}", not_downloadable_message(artifact, *paid))]
    NotDownloadable { artifact: String, paid: bool },

    #[error("Downloaded {artifact} does not match its expected digests (expected {expected}, got {actual})")]
    DownloadHashMismatch {
        artifact: String,
        expected: DigestSet,
        actual: DigestSet,
    },

    #[error("Archive for {artifact} contains no '{marker}' marker file")]
    ExtractionRootMissing { artifact: String, marker: String },

    #[error("Archive for {artifact} has several equally shallow roots: {}", candidates.join(", "))]
    ExtractionRootAmbiguous {
        artifact: String,
        candidates: Vec<String>,
    },

    #[error("Lock file is stale (distribution fingerprint {expected}, lock records {found}); re-resolve before building")]
    StaleLock { expected: String, found: String },

    #[error("Git source for {artifact} at '{reference}' failed: {source}")]
    Git {
        artifact: String,
        reference: String,
        #[source]
        source: GitError,
    },

    #[error("Index lookup for {artifact} failed: {source}")]
    Index {
        artifact: String,
        #[source]
        source: IndexError,
    },

    #[error("Extracting {artifact} failed: {source}")]
    Extract {
        artifact: String,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    CacheKey(#[from] CacheKeyError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Customise(#[from] CustomiseError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid lock file: {0}")]
    LockFile(#[from] LockFileError),

    #[error("Invalid distribution file: {0}")]
    Distribution(#[from] DistributionError),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn index(artifact: &str) -> impl FnOnce(IndexError) -> Error + '_ {
        move |source| Error::Index {
            artifact: artifact.to_string(),
            source,
        }
    }

    pub(crate) fn extract(artifact: &str) -> impl FnOnce(ExtractError) -> Error + '_ {
        move |source| Error::Extract {
            artifact: artifact.to_string(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    /// Whether this is the refusal to build from a stale lock.
    pub fn is_stale_lock(&self) -> bool {
        matches!(self, Error::StaleLock { .. })
    }
}

fn not_downloadable_message(artifact: &str, paid: bool) -> String {
    if paid {
        format!(
            "Plugin {artifact} is a paid plugin; purchase it and provide a license key that grants access"
        )
    } else {
        format!("Plugin {artifact} cannot be downloaded from the marketplace")
    }
}
