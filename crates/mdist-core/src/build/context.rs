//! Per-build state shared by staging, customisation and packaging.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use mdist_schema::LockFile;

/// Where the current clamp value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampOrigin {
    /// An explicit epoch (`SOURCE_DATE_EPOCH`).
    Override,
    /// The newest file of an extracted source archive.
    Source,
    /// Wall-clock time at build start, used until a source is seen.
    BuildStart,
}

/// The ceiling applied to every mtime written to the release.
///
/// Starts at the override or the build start time. The first source mtime
/// replaces a build-start value outright; after that each source can only
/// push the clamp past itself, never pull it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtimeClamp {
    value: i64,
    origin: ClampOrigin,
    build_start: i64,
}

impl MtimeClamp {
    pub fn new(override_epoch: Option<i64>, build_start: i64) -> Self {
        match override_epoch {
            Some(epoch) => Self {
                value: epoch,
                origin: ClampOrigin::Override,
                build_start,
            },
            None => Self {
                value: build_start,
                origin: ClampOrigin::BuildStart,
                build_start,
            },
        }
    }

    /// Fold in the newest mtime of an extracted source.
    pub fn add_source_time(&mut self, source: i64) {
        if source > self.build_start {
            tracing::warn!(
                "Source file dated {source} is newer than the build start ({}); ignoring it for the mtime clamp",
                self.build_start
            );
            return;
        }
        if self.origin == ClampOrigin::BuildStart {
            self.value = source;
            self.origin = ClampOrigin::Source;
        } else {
            self.value = self.value.max(source + 1);
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn origin(&self) -> ClampOrigin {
        self.origin
    }

    pub fn clamp(&self, mtime: i64) -> i64 {
        mtime.min(self.value)
    }
}

/// Mutable state of one build invocation.
#[derive(Debug)]
pub struct BuildContext {
    root: PathBuf,
    lock: LockFile,
    removed_files: BTreeSet<String>,
    pub clamp: MtimeClamp,
    outcomes: BTreeMap<String, serde_json::Value>,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>, lock: LockFile, clamp: MtimeClamp) -> Self {
        Self {
            root: root.into(),
            lock,
            removed_files: BTreeSet::new(),
            clamp,
            outcomes: BTreeMap::new(),
        }
    }

    /// The staging directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock(&self) -> &LockFile {
        &self.lock
    }

    /// `path` relative to the staging root, `/`-separated.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Record a removed path, given absolute or already relative.
    pub fn record_removed(&mut self, path: &Path) {
        let rel = if path.is_absolute() {
            self.relative(path)
        } else {
            Some(path.to_string_lossy().replace('\\', "/"))
        };
        if let Some(rel) = rel {
            self.removed_files.insert(rel);
        }
    }

    pub fn removed_files(&self) -> &BTreeSet<String> {
        &self.removed_files
    }

    /// Store the result record of a customisation operation.
    pub fn record_outcome(&mut self, operation: &str, outcome: serde_json::Value) {
        self.outcomes.insert(operation.to_string(), outcome);
    }

    pub fn outcomes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.outcomes
    }
}
