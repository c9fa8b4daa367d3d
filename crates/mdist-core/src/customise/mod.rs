//! Customisation of the staged tree
//!
//! Turns the `[customisation]` table into ordered operations: built-in and
//! user-declared removals, the config and autoload rewrites, manifest
//! regeneration and the duplicate report. Each operation is ordered against
//! the FILES, PLUGINS, CONFIG and ALL phase markers; see [`order`].

pub mod autoload;
pub mod config;
pub mod duplicates;
pub mod ini;
pub mod manifest;
pub mod order;
pub mod remove;

use std::io;
use std::path::{Path, PathBuf};

use mdist_schema::CustomisationConfig;
use thiserror::Error;

use crate::build::context::BuildContext;
use crate::error::Error;
use crate::reporter::Reporter;
use order::{ALL, CONFIG, OrderedOperation, order_operations};
use remove::{PathMatcher, builtin_removals};

#[derive(Error, Debug)]
pub enum CustomiseError {
    #[error("I/O error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("Operation '{operation}' has an invalid rule: {source}")]
    InvalidRule {
        operation: String,
        source: remove::RuleError,
    },

    #[error("Malformed {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },
}

impl CustomiseError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn walk(path: &Path, source: walkdir::Error) -> Self {
        Self::Walk {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &Path, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Removal step built from path rules; records how many entries it deleted.
fn removal<'a>(
    name: &str,
    requires: impl IntoIterator<Item = String>,
    affects: impl IntoIterator<Item = String>,
    rules: &mdist_schema::PathRules,
) -> Result<OrderedOperation<'a>, CustomiseError> {
    let matcher = PathMatcher::new(rules).map_err(|source| CustomiseError::InvalidRule {
        operation: name.to_string(),
        source,
    })?;
    let outcome_key = order::normalise_name(name);
    Ok(OrderedOperation::new(name)
        .requires(requires)
        .affects(affects)
        .with_action(move |ctx: &mut BuildContext| {
            let removed = matcher.remove_from(ctx)?;
            ctx.record_outcome(&outcome_key, serde_json::json!({ "removed": removed }));
            Ok(())
        }))
}

/// Every operation `config` enables, unordered.
pub fn operations(config: &CustomisationConfig) -> Result<Vec<OrderedOperation<'static>>, CustomiseError> {
    let mut ops = Vec::new();

    for builtin in builtin_removals(&config.remove) {
        ops.push(removal(
            builtin.name,
            builtin.requires.iter().map(|s| (*s).to_string()),
            builtin.affects.iter().map(|s| (*s).to_string()),
            &builtin.rules,
        )?);
    }

    for custom in &config.custom {
        ops.push(removal(
            &custom.name,
            custom.requires.iter().cloned(),
            custom.affects.iter().cloned(),
            &custom.rules,
        )?);
    }

    if config.config.update_plugins {
        ops.push(
            OrderedOperation::new(config::UPDATE_CONFIG)
                .requires([CONFIG])
                .affects([ALL])
                .with_action(config::update_plugins),
        );
    }
    if config.autoload.regenerate {
        ops.push(
            OrderedOperation::new("autoload")
                .requires([CONFIG])
                .affects([ALL])
                .with_action(autoload::prune_autoload),
        );
    }
    if config.manifest.regenerate {
        ops.push(
            OrderedOperation::new("manifest")
                .requires([ALL])
                .with_action(manifest::regenerate_manifest),
        );
    }
    if config.duplicates.report {
        ops.push(
            OrderedOperation::new("duplicates")
                .requires([ALL])
                .with_action(duplicates::report_duplicates),
        );
    }
    Ok(ops)
}

/// Order and run the customisation operations over the staging tree.
pub fn apply(config: &CustomisationConfig, ctx: &mut BuildContext, reporter: &dyn Reporter) -> Result<(), Error> {
    let ordered = order_operations(operations(config)?)?;
    for mut op in ordered {
        if op.is_phase() {
            tracing::debug!("Reached phase {}", op.name);
            continue;
        }
        reporter.operation(&op.name);
        tracing::info!("Running customisation '{}'", op.name);
        op.run(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_context(root: &Path) -> BuildContext {
    use crate::build::context::MtimeClamp;

    let lock = mdist_schema::LockFile::from_toml(
        r#"
distribution_fingerprint = "x"
[core]
version = "5.0.0"
download_link = "https://builds.example/matomo-5.0.0.zip"
extraction_root = "matomo/"
[core.content_hash]
sha256 = "00"
"#,
    )
    .unwrap();
    BuildContext::new(root, lock, MtimeClamp::new(Some(1_000), 2_000))
}
