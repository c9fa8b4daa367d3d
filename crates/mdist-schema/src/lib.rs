//! Shared data model for mdist.
//!
//! Everything here is pure data plus parsing: version constraints and their
//! ordering, digest sets, cache keys, and the distribution and lock files.
//! Network, filesystem and archive handling live in `mdist-core`.

pub mod distribution;
pub mod hash;
pub mod lock;
pub mod types;
pub mod version;

// Re-exports
pub use distribution::{CustomisationConfig, Distribution, PathRules, PluginSource};
pub use hash::{DigestSet, HashAlgorithm};
pub use lock::{GitLock, LockEntry, LockFile, RawLock, VersionedLock};
pub use types::{CacheKey, CacheKeyError};
pub use version::{VersionConstraint, compare_versions};

/// Signing key fingerprint of official core product releases.
pub const CORE_RELEASE_FINGERPRINT: &str = "0x814E346FA01A20DBB04B6807B5DBD5925590A237";
