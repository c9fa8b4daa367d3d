//! Prune composer's generated class maps of files removed from the tree.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::CustomiseError;
use super::manifest::{join_listing, owned, split_listing};
use crate::build::context::BuildContext;

pub const AUTOLOAD_CLASSMAP: &str = "vendor/composer/autoload_classmap.php";
pub const AUTOLOAD_STATIC: &str = "vendor/composer/autoload_static.php";

// 'Class' => $vendorDir . '/path/File.php',
static CLASSMAP_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^.*? => \$(vendorDir|baseDir) \. (?:'([^']*)'|"([^"]*)"),$"#)
        .expect("valid classmap entry regex")
});

// 'Class' => __DIR__ . '/..' . '/path/File.php',
static STATIC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^.*? => __DIR__ \. (?:'/([^']*)'|"/([^"]*)") \. (?:'([^']*)'|"([^"]*)"),$"#)
        .expect("valid static classmap entry regex")
});

fn either<'c>(captures: &'c Captures<'_>, first: usize, second: usize) -> &'c str {
    captures
        .get(first)
        .or_else(|| captures.get(second))
        .map_or("", |m| m.as_str())
}

/// Remove class map lines whose file no longer exists from both autoload
/// files.
pub fn prune_autoload(ctx: &mut BuildContext) -> Result<(), CustomiseError> {
    let root = ctx.root().to_path_buf();

    let classmap = prune_listing(ctx, AUTOLOAD_CLASSMAP, "return array(", &CLASSMAP_ENTRY, |c| {
        let base = match &c[1] {
            "vendorDir" => root.join("vendor"),
            _ => root.clone(),
        };
        base.join(either(c, 2, 3).trim_start_matches('/'))
    })?;

    let composer_dir = root.join("vendor/composer");
    let statics = prune_listing(
        ctx,
        AUTOLOAD_STATIC,
        "public static $classMap = array (",
        &STATIC_ENTRY,
        |c| {
            let joined = format!("{}{}", either(c, 1, 2), either(c, 3, 4));
            composer_dir.join(joined.trim_start_matches('/'))
        },
    )?;

    if classmap.is_some() || statics.is_some() {
        ctx.record_outcome(
            "autoload",
            serde_json::json!({
                "classmap_pruned": classmap.unwrap_or(0),
                "static_pruned": statics.unwrap_or(0),
            }),
        );
    }
    Ok(())
}

/// Rewrite one listing file; `None` when it does not exist.
fn prune_listing(
    ctx: &BuildContext,
    relative: &str,
    opening: &str,
    entry: &Regex,
    target: impl Fn(&Captures<'_>) -> PathBuf,
) -> Result<Option<usize>, CustomiseError> {
    let path = ctx.root().join(relative);
    if !path.is_file() {
        tracing::debug!("{relative} not found, skipping");
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(CustomiseError::io(&path))?;
    let (prefix, entries, suffix) = split_listing(&text, opening, entry);

    let mut pruned = 0;
    let mut kept = Vec::with_capacity(entries.len());
    for line in entries {
        let Some(captures) = entry.captures(line) else {
            continue;
        };
        let file = target(&captures);
        if file.is_file() {
            kept.push(line.to_string());
        } else {
            tracing::debug!("{relative}: dropping entry for {}", file.display());
            pruned += 1;
        }
    }
    kept.sort();

    let prefix = owned(prefix);
    let suffix = owned(suffix);
    let rewritten = join_listing(&text, [prefix.as_slice(), kept.as_slice(), suffix.as_slice()]);
    fs::write(&path, rewritten).map_err(CustomiseError::io(&path))?;
    Ok(Some(pruned))
}
