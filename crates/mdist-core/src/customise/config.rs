//! Reconcile the plugin lists in `config/global.ini.php` with the plugins
//! actually present in the staged tree.

use std::fs;

use super::CustomiseError;
use super::ini::{IniDocument, IniEntry, IniValue};
use crate::build::context::BuildContext;
use crate::sync::root::PLUGIN_MARKER;

pub const GLOBAL_CONFIG: &str = "config/global.ini.php";

/// Operation name, kept distinct from the `CONFIG` phase marker.
pub const UPDATE_CONFIG: &str = "update-config";

/// Drop `Plugins[]` entries whose folder is gone and make sure every core
/// plugin (one without a `plugin.json`) is in `PluginsInstalled[]`.
pub fn update_plugins(ctx: &mut BuildContext) -> Result<(), CustomiseError> {
    let path = ctx.root().join(GLOBAL_CONFIG);
    if !path.is_file() {
        tracing::debug!("{GLOBAL_CONFIG} not found, skipping plugin list update");
        return Ok(());
    }
    let text = fs::read_to_string(&path).map_err(CustomiseError::io(&path))?;
    let mut doc = IniDocument::parse(&text).map_err(|e| CustomiseError::malformed(&path, e.to_string()))?;

    let listed: Vec<IniValue> = doc
        .section("Plugins")
        .and_then(|s| s.array("Plugins"))
        .map(<[IniValue]>::to_vec)
        .unwrap_or_default();
    let mut installed: Vec<IniValue> = doc
        .section("PluginsInstalled")
        .and_then(|s| s.array("PluginsInstalled"))
        .map(<[IniValue]>::to_vec)
        .unwrap_or_default();

    let plugins_dir = ctx.root().join("plugins");
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    let mut added = Vec::new();
    for value in listed {
        let Some(name) = value.as_text().map(str::to_string) else {
            kept.push(value);
            continue;
        };
        let folder = plugins_dir.join(&name);
        if !folder.is_dir() {
            tracing::debug!("Dropping plugin {name}, {} does not exist", folder.display());
            dropped.push(name);
            continue;
        }
        if !folder.join(PLUGIN_MARKER).exists() && !installed.contains(&value) {
            tracing::debug!("Core plugin {name} is installed by default");
            installed.push(value.clone());
            added.push(name);
        }
        kept.push(value);
    }

    doc.section_mut("Plugins").set("Plugins", IniEntry::Array(kept));
    doc.section_mut("PluginsInstalled")
        .set("PluginsInstalled", IniEntry::Array(installed));
    fs::write(&path, doc.to_string()).map_err(CustomiseError::io(&path))?;

    ctx.record_outcome(
        UPDATE_CONFIG,
        serde_json::json!({ "dropped_plugins": dropped, "installed_plugins": added }),
    );
    Ok(())
}
