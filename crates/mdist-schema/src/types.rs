//! Validated identifiers.

use std::fmt;

use thiserror::Error;

/// Error returned when a cache key contains characters outside `[0-9a-z._-]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid cache key '{0}': only lowercase letters, digits, '-', '_' and '.' are allowed")]
pub struct CacheKeyError(pub String);

/// A validated cache key.
///
/// Keys end up as file names in the cache directory, so they are restricted
/// to lowercase ASCII alphanumerics, `-`, `_` and `.`, must be non-empty, and
/// may not start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate `key` as-is.
    ///
    /// # Errors
    ///
    /// Returns [`CacheKeyError`] if the key is empty, starts with `.`, or
    /// contains a character outside the allowed set.
    pub fn new(key: impl Into<String>) -> Result<Self, CacheKeyError> {
        let key = key.into();
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b'.'));
        if valid {
            Ok(Self(key))
        } else {
            Err(CacheKeyError(key))
        }
    }

    /// Build a key from parts joined with `-`, lowercasing first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheKeyError`] if the joined key is still invalid after
    /// lowercasing (e.g. a plugin name containing `/`).
    pub fn from_parts(parts: &[&str]) -> Result<Self, CacheKeyError> {
        Self::new(parts.join("-").to_ascii_lowercase())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(CacheKey::new("matomo-5.1.0-zip").is_ok());
        assert!(CacheKey::new("git-plugin-foo_bar-0a1b2c-tar").is_ok());
        assert_eq!(
            CacheKey::from_parts(&["plugin", "CustomAlerts", "5.0.1", "zip"])
                .unwrap()
                .as_str(),
            "plugin-customalerts-5.0.1-zip"
        );
    }

    #[test]
    fn test_rejects_path_injection() {
        assert!(CacheKey::new("").is_err());
        assert!(CacheKey::new("../etc/passwd").is_err());
        assert!(CacheKey::new("a/b").is_err());
        assert!(CacheKey::new("..").is_err());
        assert!(CacheKey::new("Upper").is_err());
        assert!(CacheKey::from_parts(&["plugin", "evil/../x"]).is_err());
    }
}
