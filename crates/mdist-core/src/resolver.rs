//! Picks the version to lock from what an index offers.

use std::collections::BTreeSet;

use mdist_schema::version::{VersionConstraint, compare_versions, is_prerelease};

/// Resolve `constraint` against `candidates`.
///
/// A `preferred` version (usually the index's "latest") that satisfies the
/// constraint wins without scanning. `Exact` constraints never scan either:
/// they succeed iff the literal is offered. Otherwise the highest matching
/// candidate under [`compare_versions`] is returned.
///
/// Pre-releases are skipped unless the constraint names one or nothing else
/// matches.
pub fn resolve(
    constraint: &VersionConstraint,
    candidates: &BTreeSet<String>,
    preferred: Option<&str>,
) -> Option<String> {
    let prereleases = constraint.allows_prereleases();
    let admissible = |version: &str| prereleases || !is_prerelease(version);

    if let Some(preferred) = preferred.filter(|p| constraint.matches(p) && admissible(p)) {
        tracing::trace!("Preferred version {preferred} satisfies {constraint}");
        return Some(preferred.to_string());
    }

    if let VersionConstraint::Exact(version) = constraint {
        return candidates.contains(version).then(|| version.clone());
    }

    let matching: Vec<&String> = candidates
        .iter()
        .filter(|candidate| constraint.matches(candidate))
        .collect();
    highest(matching.iter().copied().filter(|v| admissible(v))).or_else(|| {
        let fallback = highest(matching.iter().copied());
        if let Some(version) = &fallback {
            tracing::debug!("Only pre-releases satisfy {constraint}, picking {version}");
        }
        fallback
    })
}

fn highest<'a>(versions: impl Iterator<Item = &'a String>) -> Option<String> {
    versions.max_by(|a, b| compare_versions(a, b)).cloned()
}
