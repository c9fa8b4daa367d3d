//! The `.build.json` record written at the staging root.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use mdist_schema::{CustomisationConfig, LockFile};
use serde::Serialize;

use super::context::BuildContext;
use crate::error::{Error, Result};

/// File name of the build record inside the release.
pub const BUILD_MANIFEST: &str = ".build.json";

#[derive(Serialize)]
struct BuildManifest<'a> {
    lock: &'a LockFile,
    customisation: &'a CustomisationConfig,
    removed_files: &'a BTreeSet<String>,
    outcomes: &'a BTreeMap<String, serde_json::Value>,
    mtime_clamp: i64,
}

/// Serialize the build record with sorted keys and write it into the
/// staging tree.
pub fn write_build_manifest(ctx: &BuildContext, customisation: &CustomisationConfig) -> Result<PathBuf> {
    let manifest = BuildManifest {
        lock: ctx.lock(),
        customisation,
        removed_files: ctx.removed_files(),
        outcomes: ctx.outcomes(),
        mtime_clamp: ctx.clamp.value(),
    };
    let path = ctx.root().join(BUILD_MANIFEST);
    // Round-trip through `Value` so every object's keys come out sorted.
    let value = serde_json::to_value(&manifest).map_err(|e| Error::io(&path)(e.into()))?;
    let mut text = serde_json::to_string_pretty(&value).map_err(|e| Error::io(&path)(e.into()))?;
    text.push('\n');
    fs::write(&path, text).map_err(Error::io(&path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::MtimeClamp;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_contents() {
        let dir = tempdir().unwrap();
        let lock = LockFile::from_toml(
            r#"
distribution_fingerprint = "abc"
[core]
version = "5.1.0"
download_link = "https://builds.example/matomo-5.1.0.zip"
extraction_root = "matomo/"
[core.content_hash]
sha256 = "00"
"#,
        )
        .unwrap();
        let mut ctx = BuildContext::new(dir.path(), lock, MtimeClamp::new(Some(1_700_000_000), 0));
        ctx.record_removed(std::path::Path::new("tests/README.md"));
        ctx.record_outcome("duplicates", serde_json::json!({"groups": []}));

        let path = write_build_manifest(&ctx, &CustomisationConfig::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["mtime_clamp"], 1_700_000_000);
        assert_eq!(parsed["lock"]["core"]["version"], "5.1.0");
        assert_eq!(parsed["removed_files"][0], "tests/README.md");
        assert!(parsed["outcomes"]["duplicates"]["groups"].is_array());
        assert_eq!(parsed["customisation"]["manifest"]["regenerate"], true);
    }
}
