//! IO modules - archive reading, extraction, permission normalization

pub mod archive;
pub mod extract;
pub mod mode;

use std::fs;
use std::time::SystemTime;

/// Modification time in whole seconds since the epoch; 0 when unavailable.
pub fn modified_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
