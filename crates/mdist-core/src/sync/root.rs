//! Extraction root detection.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::io::archive;

/// Marker file at the root of a core release.
pub const CORE_MARKER: &str = "piwik.php";
/// Marker file at the root of a plugin.
pub const PLUGIN_MARKER: &str = "plugin.json";

/// Find the slash-terminated directory inside `data` that holds `marker`.
///
/// Every directory containing the marker is a candidate; the shallowest one
/// wins. Several candidates at the shallowest depth make the layout
/// ambiguous.
pub fn detect_root(data: &[u8], marker: &str, artifact: &str) -> Result<String> {
    let names = archive::member_names(data).map_err(Error::extract(artifact))?;

    let candidates: BTreeSet<String> = names
        .iter()
        .map(|name| name.trim_start_matches("./"))
        .filter_map(|name| {
            if name == marker {
                Some(String::new())
            } else {
                name.strip_suffix(marker)
                    .filter(|dir| dir.ends_with('/'))
                    .map(str::to_string)
            }
        })
        .collect();

    let Some(depth) = candidates.iter().map(|c| c.matches('/').count()).min() else {
        return Err(Error::ExtractionRootMissing {
            artifact: artifact.to_string(),
            marker: marker.to_string(),
        });
    };
    let mut shallowest: Vec<String> = candidates
        .into_iter()
        .filter(|c| c.matches('/').count() == depth)
        .collect();

    if shallowest.len() > 1 {
        return Err(Error::ExtractionRootAmbiguous {
            artifact: artifact.to_string(),
            candidates: shallowest,
        });
    }
    let root = shallowest.pop().unwrap_or_default();
    tracing::debug!("Extraction root of {artifact} is '{root}'");
    Ok(root)
}
