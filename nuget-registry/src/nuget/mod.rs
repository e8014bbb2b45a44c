//! # NuGet V3 Protocol Core
//!
//! Ingestion and retrieval pipeline for NuGet packages:
//!
//! ```text
//! handlers ──► upload ──► metadata / symbols ──► repository
//!          └─► retrieval ──► repository ──► response
//! ```
//!
//! - [`metadata`]: reads the `.nuspec` manifest out of an uploaded archive
//! - [`symbols`]: extracts portable PDB blobs and their ids from a `.snupkg`
//! - [`response`]: builds the service index, search, registration and
//!   version-list documents
//! - [`upload`]: publish orchestration for packages and symbol packages
//! - [`retrieval`]: download, listing, search and delete orchestration
//! - [`handlers`]: the axum boundary

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::repository::{Package, PackageFile, PackageVersion};
use crate::types::PackageKind;
use crate::version::NuGetVersion;

pub mod handlers;
pub mod metadata;
pub mod response;
pub mod retrieval;
pub mod symbols;
pub mod upload;


pub use metadata::parse_package_metadata;
pub use symbols::{extract_portable_pdbs, PortablePdb};

/// Property holding the lowercased id of a stored debug blob.
pub const PROPERTY_SYMBOL_ID: &str = "nuget.symbol.id";

/// Failures raised while reading an uploaded archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("archive does not contain a .nuspec file")]
    MissingManifest,

    #[error(".nuspec file is too large ({size} bytes, limit {max})")]
    ManifestTooLarge { size: u64, max: u64 },

    #[error(".nuspec file is invalid: {0}")]
    InvalidManifest(String),

    #[error("package id is invalid: {0}")]
    InvalidIdentifier(String),

    #[error("package version is invalid: {0}")]
    InvalidVersion(String),

    #[error("unexpected package type: expected {expected}, got {actual}")]
    UnexpectedPackageType {
        expected: PackageKind,
        actual: PackageKind,
    },

    #[error("invalid package archive: {0}")]
    InvalidArchive(String),

    #[error("invalid symbol file {name}: {reason}")]
    InvalidSymbolArchive { name: String, reason: String },

    #[error("symbol file {name} is too large ({size} bytes, limit {max})")]
    SymbolTooLarge { name: String, size: u64, max: u64 },

    #[error("symbol files exceed the combined limit ({total} bytes, limit {max})")]
    SymbolsTooLarge { total: u64, max: u64 },

    #[error("I/O error while reading archive: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ExtractError::Io(e),
            other => ExtractError::InvalidArchive(other.to_string()),
        }
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// One dependency declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    /// Version range as written in the manifest; empty means any version
    #[serde(default)]
    pub version: String,
}

/// Descriptive manifest metadata stored with each version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub authors: String,
    pub owners: String,
    pub description: String,
    pub summary: String,
    pub release_notes: String,
    pub project_url: String,
    pub repository_url: String,
    pub icon_url: String,
    pub license_url: String,
    pub tags: String,
    pub require_license_acceptance: bool,
    /// Dependencies keyed by target framework; `""` holds ungrouped ones
    pub dependencies: BTreeMap<String, Vec<Dependency>>,
}

/// Identity and metadata read from an uploaded archive.
#[derive(Debug, Clone)]
pub struct ParsedPackage {
    pub id: String,
    /// Normalised version string
    pub version: String,
    pub kind: PackageKind,
    pub metadata: Metadata,
}

impl ParsedPackage {
    /// Lowercased file name of the archive as stored.
    pub fn file_name(&self) -> String {
        format!("{}.{}.{}", self.id, self.version, self.kind.extension()).to_lowercase()
    }
}

/// Read-only join of a package, one version and its files.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub package: Package,
    pub version: PackageVersion,
    pub semver: NuGetVersion,
    pub metadata: Metadata,
    pub files: Vec<PackageFile>,
}

#[cfg(test)]
mod descriptor_tests {
    use super::*;

    #[test]
    fn test_file_name_is_lowercase() {
        let parsed = ParsedPackage {
            id: "My.Package".to_string(),
            version: "1.0.0-Beta".to_string(),
            kind: PackageKind::Symbols,
            metadata: Metadata::default(),
        };
        assert_eq!(parsed.file_name(), "my.package.1.0.0-beta.snupkg");
    }

    #[test]
    fn test_metadata_tolerates_missing_fields() {
        let metadata: Metadata = serde_json::from_str(r#"{"description":"d"}"#).unwrap();
        assert_eq!(metadata.description, "d");
        assert!(metadata.dependencies.is_empty());
    }
}
