use mdist_schema::{CacheKey, VersionConstraint, VersionedLock};

use super::Synchronizer;
use super::root::{PLUGIN_MARKER, detect_root};
use crate::error::{Error, Result};
use crate::index::PluginInfo;
use crate::reporter::ArtifactStatus;
use crate::resolver::resolve;

/// Cache key of a marketplace plugin release.
pub(crate) fn plugin_cache_key(name: &str, version: &str) -> Result<CacheKey> {
    Ok(CacheKey::from_parts(&["plugin", name, version, "zip"])?)
}

/// Fail with [`Error::NotDownloadable`] unless the marketplace lets us fetch
/// `info`'s plugin.
pub(crate) fn assert_downloadable(name: &str, info: &PluginInfo) -> Result<()> {
    if info.downloadable {
        Ok(())
    } else {
        Err(Error::NotDownloadable {
            artifact: name.to_string(),
            paid: info.paid,
        })
    }
}

impl Synchronizer<'_> {
    pub(super) fn sync_versioned_plugin(
        &self,
        name: &str,
        constraint: &VersionConstraint,
        previous: Option<&VersionedLock>,
        core_version: &str,
        php_version: &str,
    ) -> Result<VersionedLock> {
        if let Some(prev) = previous.filter(|p| constraint.matches(&p.version)) {
            self.report(name, &prev.version, ArtifactStatus::Reused);
            return Ok(prev.clone());
        }

        let index = self.sources.plugins;
        let info = index
            .plugin_info(name, core_version, self.license)
            .map_err(Error::index(name))?;
        assert_downloadable(name, &info)?;

        let (versions, preferred) = info.candidates(core_version, php_version);
        let no_match = || Error::NoMatchingVersion {
            artifact: name.to_string(),
            constraint: format!("{constraint} (core {core_version}, php {php_version})"),
        };
        let version = resolve(constraint, &versions, preferred.as_deref()).ok_or_else(no_match)?;
        let release = info.release(&version).ok_or_else(no_match)?;

        let data = index
            .download(&release.download_url, self.license)
            .map_err(Error::index(name))?;
        let content_hash = self
            .cache
            .store(&plugin_cache_key(name, &version)?, &data)?;
        let extraction_root = detect_root(&data, PLUGIN_MARKER, name)?;

        self.report(name, &version, ArtifactStatus::Resolved);
        Ok(VersionedLock {
            version,
            download_link: release.download_url.clone(),
            content_hash,
            extraction_root,
        })
    }
}
