use std::collections::BTreeSet;

use mdist_schema::lock::CORE_ARTIFACT;
use mdist_schema::{CacheKey, VersionConstraint, VersionedLock};

use super::Synchronizer;
use super::root::{CORE_MARKER, detect_root};
use crate::error::{Error, Result};
use crate::reporter::ArtifactStatus;
use crate::resolver::resolve;

/// Cache key of a core release archive.
pub(crate) fn core_cache_key(version: &str) -> Result<CacheKey> {
    Ok(CacheKey::from_parts(&["matomo", version, "zip"])?)
}

impl Synchronizer<'_> {
    pub(super) fn sync_core(
        &self,
        constraint: &VersionConstraint,
        previous: Option<&VersionedLock>,
    ) -> Result<VersionedLock> {
        if let Some(prev) = previous.filter(|p| constraint.matches(&p.version)) {
            self.report(CORE_ARTIFACT, &prev.version, ArtifactStatus::Reused);
            return Ok(prev.clone());
        }

        let index = self.sources.core;
        let latest = index.latest_version().map_err(Error::index(CORE_ARTIFACT))?;
        let version = match resolve(constraint, &BTreeSet::new(), Some(&latest)) {
            Some(version) => version,
            None => {
                tracing::debug!("Latest core {latest} does not satisfy {constraint}, listing releases");
                let versions = index.versions().map_err(Error::index(CORE_ARTIFACT))?;
                resolve(constraint, &versions, None).ok_or_else(|| Error::NoMatchingVersion {
                    artifact: CORE_ARTIFACT.to_string(),
                    constraint: constraint.to_string(),
                })?
            }
        };

        let download_link = index.download_link(&version);
        let data = index
            .download(&download_link)
            .map_err(Error::index(CORE_ARTIFACT))?;
        let content_hash = self.cache.store(&core_cache_key(&version)?, &data)?;
        let extraction_root = detect_root(&data, CORE_MARKER, CORE_ARTIFACT)?;

        self.report(CORE_ARTIFACT, &version, ArtifactStatus::Resolved);
        Ok(VersionedLock {
            version,
            download_link,
            content_hash,
            extraction_root,
        })
    }
}
