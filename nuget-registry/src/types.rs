//! Strong type definitions for registry identifiers
//!
//! Type-safe wrappers that keep owners, package ecosystems and package kinds
//! from being mixed up with plain strings.

use crate::validation::{validate_owner_name, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated owner name (the namespace a package lives in)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner(String);

/// Package ecosystem stored in the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    NuGet,
}

/// The kind of archive a `.nuspec` declares itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageKind {
    /// Ordinary package consumed as a dependency (`.nupkg`)
    Dependency,
    /// Companion archive carrying debug symbols (`.snupkg`)
    Symbols,
}

impl Owner {
    /// Create a new Owner with validation
    pub fn new(name: impl Into<String>) -> ValidationResult<Self> {
        let name = name.into();
        validate_owner_name(&name)?;
        Ok(Owner(name))
    }

    /// Get the owner name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::NuGet => "nuget",
        }
    }
}

impl PackageKind {
    /// File extension of the stored archive for this kind
    pub fn extension(&self) -> &'static str {
        match self {
            PackageKind::Dependency => "nupkg",
            PackageKind::Symbols => "snupkg",
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Dependency => write!(f, "dependency package"),
            PackageKind::Symbols => write!(f, "symbols package"),
        }
    }
}

impl FromStr for Owner {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Owner::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_validation() {
        assert!(Owner::new("acme").is_ok());
        assert!(Owner::new("").is_err());
        assert!(Owner::new("a/b").is_err());
        assert_eq!("acme".parse::<Owner>().unwrap().as_str(), "acme");
    }

    #[test]
    fn test_package_type_display() {
        assert_eq!(PackageType::NuGet.to_string(), "nuget");
    }

    #[test]
    fn test_package_kind_extension() {
        assert_eq!(PackageKind::Dependency.extension(), "nupkg");
        assert_eq!(PackageKind::Symbols.extension(), "snupkg");
    }
}
