//! Regenerate the product's file manifest (`config/manifest.inc.php`).
//!
//! The product checks its installation against this list, so after
//! customisation every entry must point at a file that still exists and
//! carry that file's current size and md5.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use md5::{Digest, Md5};
use regex::Regex;

use super::CustomiseError;
use crate::build::context::BuildContext;
use crate::io::modified_secs;

pub const FILE_MANIFEST: &str = "config/manifest.inc.php";

static MANIFEST_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s+)"(.*?)" => .*,$"#).expect("valid manifest entry regex")
});

/// Split lines into the header up to and including the line containing
/// `opening`, the run of lines matching `entry`, and whatever follows.
pub(crate) fn split_listing<'t>(
    text: &'t str,
    opening: &str,
    entry: &Regex,
) -> (Vec<&'t str>, Vec<&'t str>, Vec<&'t str>) {
    let mut lines = text.lines();
    let mut prefix = Vec::new();
    for line in lines.by_ref() {
        prefix.push(line);
        if line.contains(opening) {
            break;
        }
    }
    let mut entries = Vec::new();
    let mut suffix = Vec::new();
    for line in lines.by_ref() {
        if entry.is_match(line) {
            entries.push(line);
        } else {
            suffix.push(line);
            break;
        }
    }
    suffix.extend(lines);
    (prefix, entries, suffix)
}

/// Join the three parts back together, keeping a trailing newline if the
/// original text had one.
pub(crate) fn join_listing(original: &str, parts: [&[String]; 3]) -> String {
    let mut text = parts.concat().join("\n");
    if original.ends_with('\n') {
        text.push('\n');
    }
    text
}

pub(crate) fn owned(lines: Vec<&str>) -> Vec<String> {
    lines.into_iter().map(str::to_string).collect()
}

/// Drop entries for missing files, refresh size and md5 of files modified
/// during the build, and sort the entries.
pub fn regenerate_manifest(ctx: &mut BuildContext) -> Result<(), CustomiseError> {
    let path = ctx.root().join(FILE_MANIFEST);
    if !path.is_file() {
        tracing::debug!("{FILE_MANIFEST} not found, skipping manifest regeneration");
        return Ok(());
    }
    let text = fs::read_to_string(&path).map_err(CustomiseError::io(&path))?;
    let (prefix, entries, suffix) = split_listing(&text, "$files", &MANIFEST_ENTRY);

    let clamp = ctx.clamp.value();
    let mut dropped = 0usize;
    let mut refreshed = 0usize;
    let mut content = Vec::with_capacity(entries.len());
    for line in entries {
        let Some(captures) = MANIFEST_ENTRY.captures(line) else {
            continue;
        };
        let (indent, name) = (&captures[1], &captures[2]);
        let file = ctx.root().join(name);
        let Ok(meta) = fs::metadata(&file) else {
            dropped += 1;
            continue;
        };
        if !meta.is_file() {
            dropped += 1;
            continue;
        }
        if modified_secs(&meta) <= clamp {
            content.push(line.to_string());
            continue;
        }
        refreshed += 1;
        let digest = md5_file(&file)?;
        content.push(format!(r#"{indent}"{name}" => array("{}", "{digest}"),"#, meta.len()));
    }
    content.sort();
    tracing::debug!("Manifest: {dropped} entries dropped, {refreshed} refreshed");

    let prefix = owned(prefix);
    let suffix = owned(suffix);
    let rewritten = join_listing(&text, [prefix.as_slice(), content.as_slice(), suffix.as_slice()]);
    fs::write(&path, rewritten).map_err(CustomiseError::io(&path))?;

    ctx.record_outcome(
        "manifest",
        serde_json::json!({ "dropped": dropped, "refreshed": refreshed }),
    );
    Ok(())
}

fn md5_file(path: &Path) -> Result<String, CustomiseError> {
    let data = fs::read(path).map_err(CustomiseError::io(path))?;
    Ok(hex::encode(Md5::digest(&data)))
}
