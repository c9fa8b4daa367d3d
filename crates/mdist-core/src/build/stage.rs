//! Populate the staging tree from locked artifacts.

use std::fs;

use mdist_schema::lock::CORE_ARTIFACT;
use mdist_schema::{CacheKey, DigestSet, LockEntry};

use super::ReleaseBuilder;
use super::context::BuildContext;
use crate::error::{Error, Result};
use crate::io::extract::extract;
use crate::sync::{
    assert_downloadable, core_cache_key, git_cache_key, plugin_cache_key, raw_cache_key,
};

impl ReleaseBuilder<'_> {
    /// Cached blob for `key`, or a fresh download that must agree with the
    /// locked digests.
    fn retrieve_or_fetch(
        &self,
        artifact: &str,
        key: &CacheKey,
        expected: &DigestSet,
        fetch: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.retrieve(key, expected)? {
            return Ok(data);
        }
        tracing::debug!("{artifact} is not cached, downloading it again");
        let data = fetch()?;
        let actual = DigestSet::compute(&data);
        if !expected.agrees_with(&actual) {
            return Err(Error::DownloadHashMismatch {
                artifact: artifact.to_string(),
                expected: expected.clone(),
                actual,
            });
        }
        self.cache.store(key, &data)?;
        Ok(data)
    }

    pub(super) fn stage_core(&self, ctx: &mut BuildContext) -> Result<()> {
        let lock = ctx.lock().core.clone();
        let data = self.retrieve_or_fetch(
            CORE_ARTIFACT,
            &core_cache_key(&lock.version)?,
            &lock.content_hash,
            || {
                self.sources
                    .core
                    .download(&lock.download_link)
                    .map_err(Error::index(CORE_ARTIFACT))
            },
        )?;

        let latest = extract(&data, ctx.root(), &lock.extraction_root)
            .map_err(Error::extract(CORE_ARTIFACT))?;
        if let Some(mtime) = latest {
            ctx.clamp.add_source_time(mtime);
        }
        self.reporter.staged(CORE_ARTIFACT, &lock.version);
        Ok(())
    }

    pub(super) fn stage_plugins(&self, ctx: &mut BuildContext) -> Result<()> {
        let plugins = ctx.lock().plugins.clone();
        let core_version = ctx.lock().core.version.clone();
        for (name, entry) in &plugins {
            let data = self.plugin_archive(name, entry, &core_version)?;

            let destination = ctx.root().join("plugins").join(name);
            if destination.exists() {
                tracing::debug!("Replacing bundled plugin {name}");
                fs::remove_dir_all(&destination).map_err(Error::io(&destination))?;
            }
            let latest = extract(&data, &destination, entry.extraction_root())
                .map_err(Error::extract(name))?;
            if let Some(mtime) = latest {
                ctx.clamp.add_source_time(mtime);
            }
            self.reporter.staged(name, entry.identity());
        }
        Ok(())
    }

    fn plugin_archive(&self, name: &str, entry: &LockEntry, core_version: &str) -> Result<Vec<u8>> {
        match entry {
            LockEntry::Versioned(lock) => {
                // Entitlement is checked again on every build.
                let info = self
                    .sources
                    .plugins
                    .plugin_info(name, core_version, self.license)
                    .map_err(Error::index(name))?;
                assert_downloadable(name, &info)?;
                self.retrieve_or_fetch(
                    name,
                    &plugin_cache_key(name, &lock.version)?,
                    &lock.content_hash,
                    || {
                        self.sources
                            .plugins
                            .download(&lock.download_link, self.license)
                            .map_err(Error::index(name))
                    },
                )
            }
            LockEntry::Git(lock) => self.retrieve_or_fetch(
                name,
                &git_cache_key(name, &lock.resolved_sha)?,
                &lock.content_hash,
                || {
                    self.sources
                        .git
                        .export(&lock.git_url, &lock.resolved_sha)
                        .map(|export| export.data)
                        .map_err(|source| Error::Git {
                            artifact: name.to_string(),
                            reference: lock.resolved_sha.clone(),
                            source,
                        })
                },
            ),
            LockEntry::Raw(lock) => self.retrieve_or_fetch(
                name,
                &raw_cache_key(name, &lock.download_link)?,
                &lock.content_hash,
                || {
                    self.sources
                        .raw
                        .fetch(&lock.download_link)
                        .map_err(Error::index(name))
                },
            ),
        }
    }
}
