//! Distribution file: what to build.
//!
//! ```toml
//! version = "5.1.*"
//! php_version = "8.1"
//! license_key = "$MATOMO_LICENSE"
//!
//! [plugins]
//! CustomAlerts = "*"
//! Internal = { git = "https://git.example/internal.git", ref = "v1.2" }
//!
//! [customisation.remove]
//! documentation = true
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::version::VersionConstraint;

/// Runtime version assumed for plugin compatibility when none is declared.
pub const DEFAULT_PHP_VERSION: &str = "7.2";

/// Ref used for git plugins that do not declare one.
pub const DEFAULT_GIT_REF: &str = "master";

/// Errors raised while reading a distribution file.
#[derive(Error, Debug)]
pub enum DistributionError {
    /// The file is not valid TOML or does not match the schema.
    #[error("invalid distribution file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where a plugin comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// Resolved against the plugin index.
    Versioned {
        /// Acceptable versions.
        constraint: VersionConstraint,
    },
    /// Exported from a git remote.
    Git {
        /// Remote URL.
        url: String,
        /// Branch, tag, or commit id.
        reference: String,
    },
    /// Downloaded from a fixed link.
    Raw {
        /// Archive URL.
        link: String,
    },
}

impl PluginSource {
    fn canonical(&self) -> String {
        match self {
            PluginSource::Versioned { constraint } => format!("versioned {constraint}"),
            PluginSource::Git { url, reference } => format!("git {url} {reference}"),
            PluginSource::Raw { link } => format!("raw {link}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PluginSourceRepr {
    Constraint(VersionConstraint),
    Versioned {
        version: VersionConstraint,
    },
    Git {
        git: String,
        #[serde(rename = "ref", default = "default_git_ref")]
        reference: String,
    },
    Raw {
        link: String,
    },
}

fn default_git_ref() -> String {
    DEFAULT_GIT_REF.to_string()
}

impl<'de> Deserialize<'de> for PluginSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PluginSourceRepr::deserialize(deserializer)? {
            PluginSourceRepr::Constraint(constraint)
            | PluginSourceRepr::Versioned {
                version: constraint,
            } => PluginSource::Versioned { constraint },
            PluginSourceRepr::Git { git, reference } => PluginSource::Git {
                url: git,
                reference,
            },
            PluginSourceRepr::Raw { link } => PluginSource::Raw { link },
        })
    }
}

/// Path-matching rules for removal operations. All matches are
/// case-insensitive against `/`-separated paths relative to the staging root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRules {
    /// Exact relative paths.
    pub paths: Vec<String>,
    /// Folders removed with their contents.
    pub folders: Vec<String>,
    /// File or directory names matched at any depth.
    pub names: Vec<String>,
    /// Names matched at any depth, ignoring one trailing extension.
    pub stems: Vec<String>,
    /// Path suffixes such as `.md`.
    pub extensions: Vec<String>,
    /// Regular expressions over the whole relative path.
    pub patterns: Vec<String>,
}

impl PathRules {
    /// Whether no rule is set.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
            && self.folders.is_empty()
            && self.names.is_empty()
            && self.stems.is_empty()
            && self.extensions.is_empty()
            && self.patterns.is_empty()
    }
}

/// A user-declared removal step with explicit ordering edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOperation {
    /// Operation name (lowercased when ordered).
    pub name: String,
    /// Operations or phases that must run first.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Operations or phases that must run after this one.
    #[serde(default)]
    pub affects: Vec<String>,
    /// What to remove.
    #[serde(flatten)]
    pub rules: PathRules,
}

/// `[customisation.manifest]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestCustomisation {
    /// Rewrite `config/manifest.inc.php` to match the customised tree.
    pub regenerate: bool,
}

impl Default for ManifestCustomisation {
    fn default() -> Self {
        Self { regenerate: true }
    }
}

/// `[customisation.remove]`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveCustomisation {
    /// Drop the bundled `Example*` plugins.
    pub example_plugins: bool,
    /// Drop tooling shipped inside vendored libraries.
    pub vendored_extras: bool,
    /// Drop readmes, changelogs and licence texts.
    pub documentation: bool,
    /// Drop build and packaging metadata.
    pub build_support: bool,
    /// Drop test suites.
    pub tests: bool,
    /// Drop git metadata files.
    pub git_support: bool,
    /// Drop the Marketplace plugin.
    pub marketplace: bool,
    /// Drop the `ProfessionalServices` plugin.
    pub professional_services: bool,
}

/// `[customisation.config]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigCustomisation {
    /// Reconcile the plugin lists in `config/global.ini.php`.
    pub update_plugins: bool,
}

impl Default for ConfigCustomisation {
    fn default() -> Self {
        Self {
            update_plugins: true,
        }
    }
}

/// `[customisation.autoload]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoloadCustomisation {
    /// Prune composer class maps of removed files.
    pub regenerate: bool,
}

impl Default for AutoloadCustomisation {
    fn default() -> Self {
        Self { regenerate: true }
    }
}

/// `[customisation.duplicates]`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicatesCustomisation {
    /// Report groups of identical files.
    pub report: bool,
}

/// Post-processing applied to the staged tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomisationConfig {
    /// Manifest regeneration.
    pub manifest: ManifestCustomisation,
    /// Built-in removals.
    pub remove: RemoveCustomisation,
    /// Config file updates.
    pub config: ConfigCustomisation,
    /// Composer autoload pruning.
    pub autoload: AutoloadCustomisation,
    /// Duplicate file report.
    pub duplicates: DuplicatesCustomisation,
    /// User-declared removal operations.
    pub custom: Vec<CustomOperation>,
}

/// A parsed distribution file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Distribution {
    /// Constraint on the core product version.
    #[serde(default)]
    pub version: VersionConstraint,
    /// Runtime version used to filter plugin releases.
    #[serde(default = "default_php_version")]
    pub php_version: String,
    /// Raw license credential: a literal, `$ENV_VAR`, or `<path`.
    #[serde(default)]
    pub license_key: Option<String>,
    /// Plugins by name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSource>,
    /// Post-processing configuration.
    #[serde(default)]
    pub customisation: CustomisationConfig,
}

fn default_php_version() -> String {
    DEFAULT_PHP_VERSION.to_string()
}

impl Distribution {
    /// Parse a distribution from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError::Parse`] on invalid TOML, unknown plugin
    /// source shapes, or invalid version constraints.
    pub fn from_toml(text: &str) -> Result<Self, DistributionError> {
        Ok(toml::from_str(text)?)
    }

    /// Stable SHA-256 fingerprint of the resolution inputs (core constraint,
    /// runtime hint, and plugin sources). Credentials and customisations do
    /// not contribute.
    pub fn fingerprint(&self) -> String {
        let mut canonical = String::new();
        let _ = writeln!(canonical, "core {}", self.version);
        let _ = writeln!(canonical, "php {}", self.php_version);
        for (name, source) in &self.plugins {
            let _ = writeln!(canonical, "plugin {name} {}", source.canonical());
        }
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = "5.1.*"
license_key = "$LICENSE"

[plugins]
CustomAlerts = "*"
QueuedTracking = { version = ">=4.0,<5" }
Internal = { git = "https://git.example/internal.git" }
Pinned = { git = "https://git.example/pinned.git", ref = "v1.2" }
Vendored = { link = "https://x.example/vendored.zip" }

[customisation.remove]
documentation = true

[[customisation.custom]]
name = "strip-maps"
requires = ["FILES"]
extensions = [".map"]
"#;

    #[test]
    fn test_parse_plugin_sources() {
        let dist = Distribution::from_toml(SAMPLE).unwrap();
        assert_eq!(dist.php_version, DEFAULT_PHP_VERSION);
        assert_eq!(
            dist.plugins["CustomAlerts"],
            PluginSource::Versioned {
                constraint: VersionConstraint::Any
            }
        );
        assert!(matches!(
            &dist.plugins["QueuedTracking"],
            PluginSource::Versioned { constraint: VersionConstraint::Range(c) } if c.len() == 2
        ));
        assert_eq!(
            dist.plugins["Internal"],
            PluginSource::Git {
                url: "https://git.example/internal.git".into(),
                reference: "master".into()
            }
        );
        assert!(matches!(&dist.plugins["Vendored"], PluginSource::Raw { .. }));
    }

    #[test]
    fn test_customisation_defaults() {
        let dist = Distribution::from_toml(SAMPLE).unwrap();
        let c = &dist.customisation;
        assert!(c.manifest.regenerate);
        assert!(c.config.update_plugins);
        assert!(c.remove.documentation);
        assert!(!c.remove.tests);
        assert_eq!(c.custom[0].rules.extensions, vec![".map".to_string()]);
        assert_eq!(c.custom[0].requires, vec!["FILES".to_string()]);
    }

    #[test]
    fn test_fingerprint_tracks_inputs_only() {
        let base = Distribution::from_toml(SAMPLE).unwrap();

        let mut relicensed = base.clone();
        relicensed.license_key = Some("other".into());
        relicensed.customisation.remove.tests = true;
        assert_eq!(base.fingerprint(), relicensed.fingerprint());

        let mut bumped = base.clone();
        bumped.version = VersionConstraint::parse("5.2.0").unwrap();
        assert_ne!(base.fingerprint(), bumped.fingerprint());

        let respelled =
            Distribution::from_toml(&SAMPLE.replace("\"5.1.*\"", "\"== 5.1.*\"")).unwrap();
        assert_eq!(base.fingerprint(), respelled.fingerprint());
    }

    #[test]
    fn test_rejects_bad_constraint() {
        assert!(Distribution::from_toml("version = \">=nope\"").is_err());
    }
}
