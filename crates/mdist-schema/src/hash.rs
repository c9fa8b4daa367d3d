//! Digest algorithms and the digest sets recorded in cache sidecars and lock files.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// A digest algorithm the cache and lock file know how to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    /// SHA-512 (the strong cryptographic baseline).
    Sha512,
    /// SHA-256.
    Sha256,
    /// BLAKE3.
    Blake3,
}

impl HashAlgorithm {
    /// Every algorithm, in the fixed order used for sidecar files.
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha256,
        HashAlgorithm::Blake3,
    ];

    /// The lowercase name used in sidecars and lock files.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Look up an algorithm by its (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(name))
    }

    /// Compute the lowercase hex digest of `data`.
    pub fn digest(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of named digests over the same bytes, e.g. `{sha512: .., blake3: ..}`.
///
/// Keys are algorithm names. Names this build does not know are kept (so a
/// lock file written by a newer build round-trips) but never used for
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestSet(BTreeMap<String, String>);

impl DigestSet {
    /// Create an empty digest set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every algorithm in [`HashAlgorithm::ALL`] over `data`.
    pub fn compute(data: &[u8]) -> Self {
        let mut set = Self::new();
        for alg in HashAlgorithm::ALL {
            set.insert(alg, alg.digest(data));
        }
        set
    }

    /// Record a digest, normalizing the hex to lowercase.
    pub fn insert(&mut self, alg: HashAlgorithm, hex_digest: impl Into<String>) {
        self.0
            .insert(alg.name().to_string(), hex_digest.into().to_ascii_lowercase());
    }

    /// The digest recorded for `alg`, if any.
    pub fn get(&self, alg: HashAlgorithm) -> Option<&str> {
        self.0.get(alg.name()).map(String::as_str)
    }

    /// Whether no digests are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(algorithm, digest)` pairs for known algorithms, in
    /// [`HashAlgorithm::ALL`] order.
    pub fn known(&self) -> impl Iterator<Item = (HashAlgorithm, &str)> {
        HashAlgorithm::ALL
            .into_iter()
            .filter_map(|alg| self.get(alg).map(|d| (alg, d)))
    }

    /// The first known algorithm for which both sets record the same digest.
    pub fn first_match(&self, other: &DigestSet) -> Option<HashAlgorithm> {
        self.known()
            .find(|(alg, digest)| other.get(*alg) == Some(*digest))
            .map(|(alg, _)| alg)
    }

    /// Two digest sets agree when they share at least one known algorithm and
    /// every shared algorithm carries the same value.
    pub fn agrees_with(&self, other: &DigestSet) -> bool {
        let mut shared = false;
        for (alg, digest) in self.known() {
            if let Some(theirs) = other.get(alg) {
                if theirs != digest {
                    return false;
                }
                shared = true;
            }
        }
        shared
    }

    /// Parse a sidecar file of `algorithm:hex` lines. Blank lines, malformed
    /// lines, and unknown algorithms are ignored.
    pub fn from_sidecar(text: &str) -> Self {
        let mut set = Self::new();
        for line in text.lines() {
            let Some((name, digest)) = line.trim().split_once(':') else {
                continue;
            };
            if let Some(alg) = HashAlgorithm::from_name(name.trim()) {
                set.insert(alg, digest.trim());
            }
        }
        set
    }

    /// Render as sidecar lines in [`HashAlgorithm::ALL`] order.
    pub fn to_sidecar(&self) -> String {
        self.known()
            .map(|(alg, digest)| format!("{alg}:{digest}\n"))
            .collect()
    }
}

impl fmt::Display for DigestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (alg, digest) in self.known() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{alg}:{digest}")?;
            first = false;
        }
        Ok(())
    }
}
