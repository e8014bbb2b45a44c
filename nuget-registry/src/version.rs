//! NuGet version parsing, normalisation and ordering
//!
//! NuGet versions are SemVer 2.0 with two relaxations: one to four numeric
//! segments are accepted (`1`, `1.2`, `1.2.3`, `1.2.3.4`), and the fourth
//! "revision" segment takes part in ordering. Pre-release labels reuse
//! [`semver::Prerelease`] for identifier validation and precedence rules.

use regex::Regex;
use semver::{BuildMetadata, Prerelease};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use crate::validation::validate_version_syntax;

/// Error raised for strings that are not NuGet versions
#[derive(Debug, thiserror::Error)]
#[error("invalid version '{input}': {reason}")]
pub struct VersionError {
    pub input: String,
    pub reason: String,
}

impl VersionError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        VersionError {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

fn version_regex() -> &'static Regex {
    static VERSION_REGEX: OnceLock<Regex> = OnceLock::new();
    VERSION_REGEX.get_or_init(|| {
        Regex::new(
            r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?(?:-([0-9A-Za-z.-]+))?(?:\+([0-9A-Za-z.-]+))?$",
        )
        .unwrap_or_else(|e| {
            panic!("Failed to compile NuGet version regex: {}. This is a bug in the code - the regex pattern should be valid.", e)
        })
    })
}

/// A parsed NuGet version.
///
/// Equality and ordering ignore build metadata and compare pre-release labels
/// case-insensitively, matching how NuGet clients resolve versions.
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    pre: String,
    pre_key: Prerelease,
}

impl NuGetVersion {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        validate_version_syntax(trimmed).map_err(|e| VersionError::new(input, e.to_string()))?;

        let caps = version_regex()
            .captures(trimmed)
            .ok_or_else(|| VersionError::new(input, "expected 1-4 numeric segments"))?;

        let segment = |idx: usize| -> Result<u64, VersionError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| VersionError::new(input, "numeric segment out of range")),
                None => Ok(0),
            }
        };

        let pre = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
        let pre_key = Prerelease::new(&pre.to_ascii_lowercase())
            .map_err(|e| VersionError::new(input, format!("pre-release label: {e}")))?;
        BuildMetadata::new(caps.get(6).map(|m| m.as_str()).unwrap_or_default())
            .map_err(|e| VersionError::new(input, format!("build metadata: {e}")))?;

        Ok(NuGetVersion {
            major: segment(1)?,
            minor: segment(2)?,
            patch: segment(3)?,
            revision: segment(4)?,
            pre: pre.to_string(),
            pre_key,
        })
    }

    /// Normalised form: `major.minor.patch[.revision][-prerelease]`.
    ///
    /// The revision is only emitted when non-zero; build metadata is dropped.
    pub fn normalized(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision > 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if !self.pre.is_empty() {
            out.push('-');
            out.push_str(&self.pre);
        }
        out
    }

}

/// Lookup key for a client-supplied version: normalised when it parses,
/// lowercased either way.
pub fn version_lookup_key(input: &str) -> String {
    match NuGetVersion::parse(input) {
        Ok(v) => v.normalized().to_lowercase(),
        Err(_) => input.trim().to_lowercase(),
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            .then_with(|| self.pre_key.cmp(&other.pre_key))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}
