use mdist_schema::{CacheKey, GitLock};

use super::Synchronizer;
use super::root::{PLUGIN_MARKER, detect_root};
use crate::error::{Error, Result};
use crate::reporter::ArtifactStatus;

/// Cache key of a git export.
pub(crate) fn git_cache_key(name: &str, sha: &str) -> Result<CacheKey> {
    Ok(CacheKey::from_parts(&["git-plugin", name, sha, "tar"])?)
}

impl Synchronizer<'_> {
    /// A git entry is only reused when the declared ref is the commit id that
    /// was locked. A branch or tag always goes back to the remote since it
    /// may have moved.
    pub(super) fn sync_git_plugin(
        &self,
        name: &str,
        url: &str,
        reference: &str,
        previous: Option<&GitLock>,
    ) -> Result<GitLock> {
        if let Some(prev) =
            previous.filter(|p| p.git_url == url && p.resolved_sha.eq_ignore_ascii_case(reference))
        {
            self.report(name, &prev.resolved_sha, ArtifactStatus::Reused);
            return Ok(prev.clone());
        }

        let export = self
            .sources
            .git
            .export(url, reference)
            .map_err(|source| Error::Git {
                artifact: name.to_string(),
                reference: reference.to_string(),
                source,
            })?;
        let content_hash = self
            .cache
            .store(&git_cache_key(name, &export.sha)?, &export.data)?;
        let extraction_root = detect_root(&export.data, PLUGIN_MARKER, name)?;

        self.report(name, &export.sha, ArtifactStatus::Resolved);
        Ok(GitLock {
            git_url: url.to_string(),
            resolved_sha: export.sha,
            content_hash,
            extraction_root,
        })
    }
}
