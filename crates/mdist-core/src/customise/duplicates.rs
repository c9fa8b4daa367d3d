//! Report groups of byte-identical files in the staged tree.

use std::collections::BTreeMap;
use std::fs;

use walkdir::WalkDir;

use super::CustomiseError;
use crate::build::context::BuildContext;

/// Group non-empty files by size, then by blake3 digest, and record every
/// group with more than one member under the `duplicates` outcome.
pub fn report_duplicates(ctx: &mut BuildContext) -> Result<(), CustomiseError> {
    let root = ctx.root().to_path_buf();
    let mut by_size: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|e| CustomiseError::walk(&root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let len = entry.metadata().map_err(|e| CustomiseError::walk(entry.path(), e))?.len();
        if len == 0 {
            continue;
        }
        if let Some(rel) = ctx.relative(entry.path()) {
            by_size.entry(len).or_default().push(rel);
        }
    }

    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut wasted = 0u64;
    for (size, files) in by_size {
        if files.len() < 2 {
            continue;
        }
        let mut by_digest: BTreeMap<[u8; 32], Vec<String>> = BTreeMap::new();
        for rel in files {
            let path = root.join(&rel);
            let data = fs::read(&path).map_err(CustomiseError::io(&path))?;
            by_digest.entry(*blake3::hash(&data).as_bytes()).or_default().push(rel);
        }
        for same in by_digest.into_values() {
            if same.len() > 1 {
                wasted += size * (same.len() as u64 - 1);
                tracing::info!("Identical files ({size} bytes): {}", same.join(", "));
                groups.push(same);
            }
        }
    }
    groups.sort();
    tracing::info!("{} duplicate groups, {wasted} bytes redundant", groups.len());

    ctx.record_outcome(
        "duplicates",
        serde_json::json!({ "groups": groups, "redundant_bytes": wasted }),
    );
    Ok(())
}
