//! Index and remote boundaries
//!
//! The lock synchronizer only talks to these traits. [`http::HttpIndex`]
//! implements the HTTP ones against the real endpoints and
//! [`git::GitCli`] drives the `git` binary; tests substitute in-memory
//! fakes.

#[cfg(feature = "network")]
pub mod http;

pub mod git;

use std::collections::BTreeSet;

use mdist_schema::VersionConstraint;
use thiserror::Error;

use crate::io::extract::ExtractError;
use crate::signature::SignatureError;

pub use git::{GitCli, GitExport};

#[derive(Error, Debug)]
pub enum IndexError {
    #[cfg(feature = "network")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("{0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("exported archive carries no commit id")]
    MissingCommitId,

    #[error("exported archive is unreadable: {0}")]
    Archive(#[from] ExtractError),

    #[error("temporary clone directory: {0}")]
    TempDir(#[source] std::io::Error),
}

/// One published release of a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRelease {
    pub version: String,
    /// Absolute download URL.
    pub download_url: String,
    /// Accepted core versions, as comma-separated clauses.
    pub requires_core: Option<String>,
    /// Accepted runtime versions, as comma-separated clauses.
    pub requires_php: Option<String>,
}

impl PluginRelease {
    /// Whether this release accepts the given core version and runtime hint.
    /// A missing requirement accepts; an unparsable one rejects.
    pub fn is_compatible(&self, core_version: &str, php_version: &str) -> bool {
        requirement_accepts(self.requires_core.as_deref(), core_version)
            && requirement_accepts(self.requires_php.as_deref(), php_version)
    }
}

fn requirement_accepts(requirement: Option<&str>, version: &str) -> bool {
    let Some(raw) = requirement.map(str::trim).filter(|r| !r.is_empty()) else {
        return true;
    };
    match VersionConstraint::parse(raw) {
        Ok(constraint) => constraint.matches(version),
        Err(e) => {
            tracing::debug!("Ignoring release with unparsable requirement '{raw}': {e}");
            false
        }
    }
}

/// What the plugin index reports about one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub downloadable: bool,
    pub paid: bool,
    pub latest_version: Option<String>,
    pub releases: Vec<PluginRelease>,
}

impl PluginInfo {
    /// Releases compatible with the given core version and runtime hint.
    pub fn compatible_releases<'a>(
        &'a self,
        core_version: &'a str,
        php_version: &'a str,
    ) -> impl Iterator<Item = &'a PluginRelease> + 'a {
        self.releases
            .iter()
            .filter(move |r| r.is_compatible(core_version, php_version))
    }

    /// Compatible version strings, plus the latest version if it survived
    /// the filter.
    pub fn candidates(
        &self,
        core_version: &str,
        php_version: &str,
    ) -> (BTreeSet<String>, Option<String>) {
        let versions: BTreeSet<String> = self
            .compatible_releases(core_version, php_version)
            .map(|r| r.version.clone())
            .collect();
        let preferred = match self.latest_version.as_deref() {
            Some(latest) if versions.contains(latest) => Some(latest.to_string()),
            Some(latest) => {
                tracing::warn!(
                    "Latest version {latest} of {} is not compatible with core {core_version} / php {php_version}",
                    self.name
                );
                None
            }
            None => None,
        };
        (versions, preferred)
    }

    pub fn release(&self, version: &str) -> Option<&PluginRelease> {
        self.releases.iter().find(|r| r.version == version)
    }
}

/// Source of core product releases.
pub trait CoreIndex {
    /// The version the index advertises as current.
    fn latest_version(&self) -> Result<String, IndexError>;

    /// Every published version.
    fn versions(&self) -> Result<BTreeSet<String>, IndexError>;

    /// Where the archive of `version` is served from.
    fn download_link(&self, version: &str) -> String;

    /// Download the archive at `link` and verify its release signature.
    fn download(&self, link: &str) -> Result<Vec<u8>, IndexError>;
}

/// The plugin marketplace.
pub trait PluginIndex {
    fn plugin_info(
        &self,
        name: &str,
        core_version: &str,
        license: Option<&str>,
    ) -> Result<PluginInfo, IndexError>;

    /// Download a release archive, authenticating with `license` if given.
    fn download(&self, url: &str, license: Option<&str>) -> Result<Vec<u8>, IndexError>;
}

/// Plain unauthenticated downloads.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, IndexError>;
}

/// A git remote that can export a tree as a tar archive.
pub trait GitRemote {
    /// Export `reference` from `url`; the result carries the full commit id.
    fn export(&self, url: &str, reference: &str) -> Result<GitExport, GitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(version: &str, core: Option<&str>, php: Option<&str>) -> PluginRelease {
        PluginRelease {
            version: version.to_string(),
            download_url: format!("https://plugins.example/Foo/{version}.zip"),
            requires_core: core.map(str::to_string),
            requires_php: php.map(str::to_string),
        }
    }

    fn info(latest: &str) -> PluginInfo {
        PluginInfo {
            name: "Foo".into(),
            downloadable: true,
            paid: false,
            latest_version: Some(latest.into()),
            releases: vec![
                release("3.0.0", Some(">=4.0.0,<5.0.0"), None),
                release("4.0.0", Some(">=5.0.0,<6.0.0"), Some(">=7.2")),
                release("4.1.0", Some(">=5.0.0,<6.0.0"), Some(">=8.1")),
                release("4.2.0", Some("not a constraint"), None),
            ],
        }
    }

    #[test]
    fn test_compatibility_filter() {
        let info = info("4.1.0");
        let (versions, preferred) = info.candidates("5.1.0", "8.2");
        assert_eq!(
            versions.into_iter().collect::<Vec<_>>(),
            vec!["4.0.0".to_string(), "4.1.0".to_string()]
        );
        assert_eq!(preferred.as_deref(), Some("4.1.0"));
    }

    #[test]
    fn test_latest_filtered_out_has_no_preference() {
        let info = info("4.1.0");
        let (versions, preferred) = info.candidates("5.1.0", "7.4");
        assert_eq!(versions.len(), 1);
        assert!(versions.contains("4.0.0"));
        assert_eq!(preferred, None);
    }

    #[test]
    fn test_missing_requirement_accepts() {
        let r = release("1.0.0", None, Some(""));
        assert!(r.is_compatible("5.0.0", "7.2"));
    }
}
