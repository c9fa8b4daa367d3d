//! Lock file data model.
//!
//! A lock records, for the core product and every plugin, the exact fetchable
//! identity that a distribution resolved to. Serialized as TOML with sorted
//! tables so that diffs stay small and two locks compare structurally.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::DigestSet;

/// Errors raised while reading or writing a lock file.
#[derive(Error, Debug)]
pub enum LockFileError {
    /// The lock file is not valid TOML or does not match the schema.
    #[error("invalid lock file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The lock could not be rendered as TOML.
    #[error("failed to serialize lock file: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A version resolved from an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedLock {
    /// The resolved version string.
    pub version: String,
    /// Where the archive was downloaded from.
    pub download_link: String,
    /// Digests of the downloaded archive.
    pub content_hash: DigestSet,
    /// Slash-terminated prefix stripped from archive members (may be empty).
    pub extraction_root: String,
}

/// A commit resolved from a git remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLock {
    /// The remote the commit was exported from.
    pub git_url: String,
    /// The full commit id the declared ref resolved to.
    pub resolved_sha: String,
    /// Digests of the exported tar archive.
    pub content_hash: DigestSet,
    /// Slash-terminated prefix stripped from archive members (may be empty).
    pub extraction_root: String,
}

/// An archive fetched from a fixed link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLock {
    /// The declared link.
    pub download_link: String,
    /// Digests of the downloaded archive.
    pub content_hash: DigestSet,
    /// Slash-terminated prefix stripped from archive members (may be empty).
    pub extraction_root: String,
}

/// Lock entry for one plugin, tagged by source kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum LockEntry {
    /// Resolved from the plugin index.
    Versioned(VersionedLock),
    /// Resolved from a git remote.
    Git(GitLock),
    /// Fetched from a direct link.
    Raw(RawLock),
}

impl LockEntry {
    /// Digests of the locked archive.
    pub fn content_hash(&self) -> &DigestSet {
        match self {
            LockEntry::Versioned(l) => &l.content_hash,
            LockEntry::Git(l) => &l.content_hash,
            LockEntry::Raw(l) => &l.content_hash,
        }
    }

    /// Prefix to strip when extracting the locked archive.
    pub fn extraction_root(&self) -> &str {
        match self {
            LockEntry::Versioned(l) => &l.extraction_root,
            LockEntry::Git(l) => &l.extraction_root,
            LockEntry::Raw(l) => &l.extraction_root,
        }
    }

    /// The resolved identity: a version, a commit id, or a link.
    pub fn identity(&self) -> &str {
        match self {
            LockEntry::Versioned(l) => &l.version,
            LockEntry::Git(l) => &l.resolved_sha,
            LockEntry::Raw(l) => &l.download_link,
        }
    }

    /// The source kind as written in the `source` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LockEntry::Versioned(_) => "versioned",
            LockEntry::Git(_) => "git",
            LockEntry::Raw(_) => "raw",
        }
    }
}

/// The resolved state of a whole distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    /// Fingerprint of the distribution inputs this lock was produced from.
    pub distribution_fingerprint: String,
    /// The core product.
    pub core: VersionedLock,
    /// Plugins by name.
    #[serde(default)]
    pub plugins: BTreeMap<String, LockEntry>,
}

impl LockFile {
    /// Parse a lock file from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`LockFileError::Parse`] if the text is not a valid lock file.
    pub fn from_toml(text: &str) -> Result<Self, LockFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Render the lock file as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`LockFileError::Serialize`] if rendering fails.
    pub fn to_toml(&self) -> Result<String, LockFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Whether this lock was produced from inputs with `fingerprint`.
    pub fn is_fresh(&self, fingerprint: &str) -> bool {
        self.distribution_fingerprint == fingerprint
    }

    /// Per-artifact differences from `previous` to `self`. The core product
    /// is reported under the name [`CORE_ARTIFACT`].
    pub fn changes_since(&self, previous: &LockFile) -> Vec<ArtifactChange> {
        let mut changes = vec![ArtifactChange {
            artifact: CORE_ARTIFACT.to_string(),
            change: if self.core == previous.core {
                Change::Unchanged
            } else {
                Change::Updated {
                    from: previous.core.version.clone(),
                    to: self.core.version.clone(),
                }
            },
        }];

        let names: std::collections::BTreeSet<&String> =
            self.plugins.keys().chain(previous.plugins.keys()).collect();
        for name in names {
            let change = match (previous.plugins.get(name), self.plugins.get(name)) {
                (None, Some(now)) => Change::Added {
                    to: now.identity().to_string(),
                },
                (Some(before), None) => Change::Removed {
                    from: before.identity().to_string(),
                },
                (Some(before), Some(now)) if before == now => Change::Unchanged,
                (Some(before), Some(now)) => Change::Updated {
                    from: before.identity().to_string(),
                    to: now.identity().to_string(),
                },
                (None, None) => continue,
            };
            changes.push(ArtifactChange {
                artifact: name.clone(),
                change,
            });
        }
        changes
    }
}

/// Name under which the core product appears in [`ArtifactChange`] lists.
pub const CORE_ARTIFACT: &str = "core";

/// How one artifact changed between two locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Newly locked.
    Added {
        /// The new identity.
        to: String,
    },
    /// No longer locked.
    Removed {
        /// The previous identity.
        from: String,
    },
    /// Locked to something different (identity or digests changed).
    Updated {
        /// The previous identity.
        from: String,
        /// The new identity.
        to: String,
    },
    /// Identical entry.
    Unchanged,
}

/// A [`Change`] attributed to a named artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactChange {
    /// Plugin name, or [`CORE_ARTIFACT`].
    pub artifact: String,
    /// What happened to it.
    pub change: Change,
}

impl fmt::Display for ArtifactChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            Change::Added { to } => write!(f, "+ {} {to}", self.artifact),
            Change::Removed { from } => write!(f, "- {} {from}", self.artifact),
            Change::Updated { from, to } => write!(f, "~ {} {from} -> {to}", self.artifact),
            Change::Unchanged => write!(f, "  {}", self.artifact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;

    fn digest(value: &str) -> DigestSet {
        let mut set = DigestSet::new();
        set.insert(HashAlgorithm::Sha256, value);
        set
    }

    fn sample() -> LockFile {
        let mut plugins = BTreeMap::new();
        plugins.insert(
            "CustomAlerts".to_string(),
            LockEntry::Versioned(VersionedLock {
                version: "5.0.1".into(),
                download_link: "https://plugins.example/CustomAlerts/download/5.0.1".into(),
                content_hash: digest("aa"),
                extraction_root: "CustomAlerts/".into(),
            }),
        );
        plugins.insert(
            "Internal".to_string(),
            LockEntry::Git(GitLock {
                git_url: "https://git.example/internal.git".into(),
                resolved_sha: "0123456789abcdef0123456789abcdef01234567".into(),
                content_hash: digest("bb"),
                extraction_root: String::new(),
            }),
        );
        LockFile {
            distribution_fingerprint: "f00d".into(),
            core: VersionedLock {
                version: "5.1.0".into(),
                download_link: "https://builds.example/matomo-5.1.0.zip".into(),
                content_hash: digest("cc"),
                extraction_root: "matomo/".into(),
            },
            plugins,
        }
    }

    #[test]
    fn test_toml_layout() {
        let text = sample().to_toml().unwrap();
        assert!(text.contains("distribution_fingerprint = \"f00d\""));
        assert!(text.contains("[plugins.CustomAlerts]"));
        assert!(text.contains("source = \"git\""));
        assert_eq!(LockFile::from_toml(&text).unwrap(), sample());
    }

    #[test]
    fn test_serialization_is_stable() {
        assert_eq!(sample().to_toml().unwrap(), sample().to_toml().unwrap());
    }

    #[test]
    fn test_changes_since() {
        let before = sample();
        let mut after = sample();
        after.plugins.remove("Internal");
        after.plugins.insert(
            "Raw".into(),
            LockEntry::Raw(RawLock {
                download_link: "https://x.example/raw.zip".into(),
                content_hash: digest("dd"),
                extraction_root: String::new(),
            }),
        );
        let changes = after.changes_since(&before);
        assert_eq!(changes[0].change, Change::Unchanged);
        assert!(changes.iter().any(|c| c.artifact == "Raw"
            && matches!(c.change, Change::Added { .. })));
        assert!(changes.iter().any(|c| c.artifact == "Internal"
            && matches!(c.change, Change::Removed { .. })));
        assert!(changes.iter().any(|c| c.artifact == "CustomAlerts"
            && c.change == Change::Unchanged));
    }
}
