use mdist_schema::{CacheKey, HashAlgorithm, RawLock};

use super::Synchronizer;
use super::root::{PLUGIN_MARKER, detect_root};
use crate::error::{Error, Result};
use crate::reporter::ArtifactStatus;

/// Cache key of a raw-link plugin: the link itself is hashed since it may
/// contain any character.
pub(crate) fn raw_cache_key(name: &str, link: &str) -> Result<CacheKey> {
    let link_digest = HashAlgorithm::Sha256.digest(link.as_bytes());
    Ok(CacheKey::from_parts(&[
        "raw-plugin",
        name,
        &link_digest[..16],
    ])?)
}

impl Synchronizer<'_> {
    pub(super) fn sync_raw_plugin(
        &self,
        name: &str,
        link: &str,
        previous: Option<&RawLock>,
    ) -> Result<RawLock> {
        if let Some(prev) = previous.filter(|p| p.download_link == link) {
            self.report(name, link, ArtifactStatus::Reused);
            return Ok(prev.clone());
        }

        let data = self.sources.raw.fetch(link).map_err(Error::index(name))?;
        let content_hash = self.cache.store(&raw_cache_key(name, link)?, &data)?;
        let extraction_root = detect_root(&data, PLUGIN_MARKER, name)?;

        self.report(name, link, ArtifactStatus::Resolved);
        Ok(RawLock {
            download_link: link.to_string(),
            content_hash,
            extraction_root,
        })
    }
}
