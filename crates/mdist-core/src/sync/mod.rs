//! Lock synchronization
//!
//! Turns a [`Distribution`] plus the previous [`LockFile`] into a new lock.
//! Each artifact either reuses its previous entry untouched (no network
//! I/O) or is resolved, downloaded, cached and inspected for its extraction
//! root. Nothing is persisted here: the caller saves the returned lock only
//! once every artifact has succeeded.

mod git;
mod plugin;
mod product;
mod raw;
pub mod root;

pub(crate) use git::git_cache_key;
pub(crate) use plugin::{assert_downloadable, plugin_cache_key};
pub(crate) use product::core_cache_key;
pub(crate) use raw::raw_cache_key;

use std::collections::BTreeMap;

use mdist_schema::{Distribution, LockEntry, LockFile, PluginSource};

use crate::cache::CacheStore;
use crate::error::Result;
use crate::index::{CoreIndex, Fetcher, GitRemote, PluginIndex};
use crate::reporter::{ArtifactStatus, Reporter};

/// The remote boundaries used while synchronizing.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub core: &'a dyn CoreIndex,
    pub plugins: &'a dyn PluginIndex,
    pub git: &'a dyn GitRemote,
    pub raw: &'a dyn Fetcher,
}

pub struct Synchronizer<'a> {
    sources: Sources<'a>,
    cache: &'a CacheStore,
    reporter: &'a dyn Reporter,
    license: Option<&'a str>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(sources: Sources<'a>, cache: &'a CacheStore, reporter: &'a dyn Reporter) -> Self {
        Self {
            sources,
            cache,
            reporter,
            license: None,
        }
    }

    /// Credential sent to the plugin marketplace.
    pub fn with_license(mut self, license: Option<&'a str>) -> Self {
        self.license = license;
        self
    }

    /// Produce the lock for `dist`, reusing entries of `previous` where they
    /// still satisfy the distribution.
    pub fn synchronize(&self, dist: &Distribution, previous: Option<&LockFile>) -> Result<LockFile> {
        self.reporter.phase("Locking");

        let core = self.sync_core(&dist.version, previous.map(|p| &p.core))?;

        let mut plugins = BTreeMap::new();
        for (name, source) in &dist.plugins {
            let prior = previous.and_then(|p| p.plugins.get(name));
            let entry = match source {
                PluginSource::Versioned { constraint } => {
                    let prior = match prior {
                        Some(LockEntry::Versioned(lock)) => Some(lock),
                        _ => None,
                    };
                    LockEntry::Versioned(self.sync_versioned_plugin(
                        name,
                        constraint,
                        prior,
                        &core.version,
                        &dist.php_version,
                    )?)
                }
                PluginSource::Git { url, reference } => {
                    let prior = match prior {
                        Some(LockEntry::Git(lock)) => Some(lock),
                        _ => None,
                    };
                    LockEntry::Git(self.sync_git_plugin(name, url, reference, prior)?)
                }
                PluginSource::Raw { link } => {
                    let prior = match prior {
                        Some(LockEntry::Raw(lock)) => Some(lock),
                        _ => None,
                    };
                    LockEntry::Raw(self.sync_raw_plugin(name, link, prior)?)
                }
            };
            plugins.insert(name.clone(), entry);
        }

        Ok(LockFile {
            distribution_fingerprint: dist.fingerprint(),
            core,
            plugins,
        })
    }

    fn report(&self, name: &str, identity: &str, status: ArtifactStatus) {
        match status {
            ArtifactStatus::Reused => tracing::debug!("Reusing locked {name} {identity}"),
            ArtifactStatus::Resolved => tracing::info!("Resolved {name} to {identity}"),
        }
        self.reporter.artifact(name, identity, status);
    }
}
