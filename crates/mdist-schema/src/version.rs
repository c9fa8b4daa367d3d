//! Version constraints and the version ordering used to pick the highest match.
//!
//! Accepted grammar, per clause (clauses are comma separated):
//! - `*` or an empty string: any version
//! - `1.2.3` (bare) or `==1.2.3`: that exact version
//! - `==1.2.*` / `!=1.2.*`: release-prefix wildcards
//! - `>=`, `<=`, `>`, `<`, `!=`: ordered comparisons
//! - `~=1.4.2`: compatible release, i.e. `>=1.4.2,==1.4.*`

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing a [`VersionConstraint`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// A clause between commas was empty (e.g. `">=1.0,,<2"`).
    #[error("empty clause in version constraint '{0}'")]
    EmptyClause(String),

    /// A clause referenced something that is not a version.
    #[error("invalid version '{version}' in constraint '{constraint}'")]
    InvalidVersion {
        /// The offending version token.
        version: String,
        /// The whole constraint being parsed.
        constraint: String,
    },

    /// A wildcard was used with an ordered comparison operator.
    #[error("wildcard versions are only allowed with == and != (in '{0}')")]
    MisplacedWildcard(String),

    /// `~=` needs at least two release segments.
    #[error("compatible-release clause needs at least two release segments (in '{0}')")]
    CompatibleTooShort(String),
}

/// Comparison operator of a single [`Clause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>=`
    GreaterEqual,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `~=`
    Compatible,
}

impl Operator {
    /// Operator tokens, longest first so prefix matching is unambiguous.
    const TOKENS: [(&'static str, Operator); 8] = [
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        (">=", Operator::GreaterEqual),
        ("<=", Operator::LessEqual),
        ("~=", Operator::Compatible),
        (">", Operator::Greater),
        ("<", Operator::Less),
        ("=", Operator::Equal),
    ];

    /// The canonical textual form of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterEqual => ">=",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Compatible => "~=",
        }
    }
}

/// One comparison, e.g. `>=4.0.0` or `==3.14.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Clause {
    /// The comparison operator.
    pub op: Operator,
    /// The version operand, without any wildcard suffix.
    pub version: String,
    /// Whether the operand ended in `.*`.
    pub wildcard: bool,
}

impl Clause {
    fn parse(raw: &str, whole: &str) -> Result<Self, ConstraintError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConstraintError::EmptyClause(whole.to_string()));
        }

        let (op, operand) = Operator::TOKENS
            .iter()
            .find_map(|(token, op)| raw.strip_prefix(token).map(|rest| (*op, rest.trim())))
            .unwrap_or((Operator::Equal, raw));

        let (operand, wildcard) = match operand.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (operand, false),
        };

        if wildcard && !matches!(op, Operator::Equal | Operator::NotEqual) {
            return Err(ConstraintError::MisplacedWildcard(whole.to_string()));
        }
        if !is_version_token(operand) {
            return Err(ConstraintError::InvalidVersion {
                version: operand.to_string(),
                constraint: whole.to_string(),
            });
        }
        if op == Operator::Compatible && VersionKey::parse(operand).release.len() < 2 {
            return Err(ConstraintError::CompatibleTooShort(whole.to_string()));
        }

        Ok(Self {
            op,
            version: operand.to_string(),
            wildcard,
        })
    }

    /// Whether `candidate` satisfies this clause.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = VersionKey::parse(candidate);
        let operand = VersionKey::parse(&self.version);
        match self.op {
            Operator::Equal if self.wildcard => candidate.has_release_prefix(&operand),
            Operator::NotEqual if self.wildcard => !candidate.has_release_prefix(&operand),
            Operator::Equal => candidate == operand,
            Operator::NotEqual => candidate != operand,
            Operator::GreaterEqual => candidate >= operand,
            Operator::LessEqual => candidate <= operand,
            Operator::Greater => candidate > operand,
            Operator::Less => candidate < operand,
            Operator::Compatible => {
                let mut prefix = operand.clone();
                prefix.release.pop();
                prefix.pre.clear();
                candidate >= operand && candidate.has_release_prefix(&prefix)
            }
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

/// A constraint on the version of one artifact.
///
/// Parsing is total over the grammar and normalizes deterministically:
/// `"*"` becomes [`VersionConstraint::Any`], a bare version or a single
/// non-wildcard `==` clause becomes [`VersionConstraint::Exact`], and
/// everything else becomes [`VersionConstraint::Range`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum VersionConstraint {
    /// Matches every candidate.
    #[default]
    Any,
    /// Matches only this literal version string.
    Exact(String),
    /// Matches candidates satisfying every clause.
    Range(Vec<Clause>),
}

impl VersionConstraint {
    /// Parse a constraint from its textual form.
    ///
    /// # Errors
    ///
    /// Returns a [`ConstraintError`] if any clause is empty, names an
    /// invalid version, or misuses a wildcard.
    pub fn parse(raw: &str) -> Result<Self, ConstraintError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::Any);
        }

        let clauses = trimmed
            .split(',')
            .map(|part| Clause::parse(part, trimmed))
            .collect::<Result<Vec<_>, _>>()?;

        if let [
            Clause {
                op: Operator::Equal,
                version,
                wildcard: false,
            },
        ] = clauses.as_slice()
        {
            return Ok(Self::Exact(version.clone()));
        }
        Ok(Self::Range(clauses))
    }

    /// Whether resolution may pick a pre-release while a final release also
    /// matches. Only a constraint that names a pre-release opts in; an exact
    /// constraint is taken literally.
    pub fn allows_prereleases(&self) -> bool {
        match self {
            Self::Any => false,
            Self::Exact(_) => true,
            Self::Range(clauses) => clauses.iter().any(|c| is_prerelease(&c.version)),
        }
    }

    /// Whether `candidate` satisfies this constraint. Pre-releases are not
    /// filtered here; see [`VersionConstraint::allows_prereleases`].
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(version) => candidate == version,
            Self::Range(clauses) => {
                is_version_token(candidate) && clauses.iter().all(|c| c.matches(candidate))
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(version) => f.write_str(version),
            Self::Range(clauses) => {
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{clause}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::str::FromStr for VersionConstraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = ConstraintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.to_string()
    }
}

/// Whether `version` carries a pre-release tail (`5.1.0-b1`, `4.0rc2`).
pub fn is_prerelease(version: &str) -> bool {
    !VersionKey::parse(version).pre.is_empty()
}

fn is_version_token(s: &str) -> bool {
    let s = s.strip_prefix('v').unwrap_or(s);
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PreSegment {
    Number(u64),
    Text(String),
}

impl Ord for PreSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for PreSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key for a version string: numeric release segments followed by an
/// optional pre-release tail. A version with a tail sorts below the same
/// release without one (`4.0.0-rc1 < 4.0.0`).
#[derive(Debug, Clone)]
struct VersionKey {
    release: Vec<u64>,
    pre: Vec<PreSegment>,
}

impl VersionKey {
    fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('v').unwrap_or(raw);
        let raw = raw.split('+').next().unwrap_or(raw);

        let mut release = Vec::new();
        let mut rest = raw;
        loop {
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                break;
            }
            release.push(rest[..digits].parse().unwrap_or(u64::MAX));
            rest = &rest[digits..];
            match rest.strip_prefix('.') {
                Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
                _ => break,
            }
        }

        let mut pre = Vec::new();
        let mut chars = rest.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut n = String::new();
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    n.push(d);
                }
                pre.push(PreSegment::Number(n.parse().unwrap_or(u64::MAX)));
            } else if c.is_ascii_alphabetic() {
                let mut t = String::new();
                while let Some(a) = chars.next_if(char::is_ascii_alphabetic) {
                    t.push(a.to_ascii_lowercase());
                }
                pre.push(PreSegment::Text(t));
            } else {
                chars.next();
            }
        }

        Self { release, pre }
    }

    fn segment(&self, i: usize) -> u64 {
        self.release.get(i).copied().unwrap_or(0)
    }

    fn has_release_prefix(&self, prefix: &Self) -> bool {
        (0..prefix.release.len()).all(|i| self.segment(i) == prefix.segment(i))
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.release.len().max(other.release.len());
        (0..width)
            .map(|i| self.segment(i).cmp(&other.segment(i)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialEq for VersionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionKey {}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order over version strings: numeric-segment-aware, pre-releases
/// below their release, ties broken by the raw string so the order is total.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::parse(a)
        .cmp(&VersionKey::parse(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(VersionConstraint::parse("*").unwrap(), VersionConstraint::Any);
        assert_eq!(VersionConstraint::parse("").unwrap(), VersionConstraint::Any);
        assert_eq!(
            VersionConstraint::parse("1.2.3").unwrap(),
            VersionConstraint::Exact("1.2.3".into())
        );
        assert_eq!(
            VersionConstraint::parse("== 1.2.3").unwrap(),
            VersionConstraint::Exact("1.2.3".into())
        );
        assert!(matches!(
            VersionConstraint::parse("==1.2.*").unwrap(),
            VersionConstraint::Range(_)
        ));
        assert!(matches!(
            VersionConstraint::parse(">=1.0,<2").unwrap(),
            VersionConstraint::Range(c) if c.len() == 2
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            VersionConstraint::parse(">=1.0,,<2"),
            Err(ConstraintError::EmptyClause(_))
        ));
        assert!(matches!(
            VersionConstraint::parse(">=banana"),
            Err(ConstraintError::InvalidVersion { .. })
        ));
        assert!(matches!(
            VersionConstraint::parse(">=1.*"),
            Err(ConstraintError::MisplacedWildcard(_))
        ));
        assert!(matches!(
            VersionConstraint::parse("~=1"),
            Err(ConstraintError::CompatibleTooShort(_))
        ));
    }

    #[test]
    fn test_display_is_canonical() {
        let c = VersionConstraint::parse(" >= 4.0 , != 4.1.* ").unwrap();
        assert_eq!(c.to_string(), ">=4.0,!=4.1.*");
        assert_eq!(VersionConstraint::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn test_exact_is_literal() {
        let c = VersionConstraint::parse("1.0").unwrap();
        assert!(c.matches("1.0"));
        assert!(!c.matches("1.0.0"));
    }

    #[test]
    fn test_range_matching() {
        let c = VersionConstraint::parse(">=3.14,<4").unwrap();
        assert!(c.matches("3.14.1"));
        assert!(c.matches("3.14"));
        assert!(!c.matches("4.0.0"));
        assert!(!c.matches("3.9.9"));
        assert!(!c.matches("not-a-version"));

        let wild = VersionConstraint::parse("==3.14.*").unwrap();
        assert!(wild.matches("3.14.0"));
        assert!(wild.matches("3.14.2-rc1"));
        assert!(!wild.matches("3.15.0"));

        let compatible = VersionConstraint::parse("~=4.2.1").unwrap();
        assert!(compatible.matches("4.2.9"));
        assert!(!compatible.matches("4.3.0"));
        assert!(!compatible.matches("4.2.0"));
    }

    #[test]
    fn test_prerelease_opt_in() {
        assert!(is_prerelease("5.1.0-b1"));
        assert!(is_prerelease("4.0rc2"));
        assert!(!is_prerelease("5.1.0"));
        assert!(!is_prerelease("v5.1.0+build7"));

        for raw in ["*", "==5.1.*", ">=5.0,<5.1", "~=5.0"] {
            assert!(!VersionConstraint::parse(raw).unwrap().allows_prereleases(), "{raw}");
        }
        for raw in [">=5.1.0-b1", "5.1.0", "==5.1.0-rc1,!=5.0.*"] {
            assert!(VersionConstraint::parse(raw).unwrap().allows_prereleases(), "{raw}");
        }
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert_eq!(compare_versions("3.10.0", "3.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("4.0.0-rc1", "4.0.0"), Ordering::Less);
        assert_eq!(compare_versions("4.0.0-b1", "4.0.0-rc1"), Ordering::Less);
        assert_eq!(compare_versions("4.0.0-rc2", "4.0.0-rc10"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            version: VersionConstraint,
        }
        let w: Wrapper = toml::from_str(r#"version = ">=1.0""#).unwrap();
        assert!(matches!(w.version, VersionConstraint::Range(_)));
        assert_eq!(toml::to_string(&w).unwrap().trim(), r#"version = ">=1.0""#);
    }
}
