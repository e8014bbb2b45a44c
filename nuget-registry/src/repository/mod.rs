//! # Package Repository Contract
//!
//! The narrow interface the ingestion pipeline and the response builder need
//! from durable storage. Implementations own their own concurrency control:
//! uniqueness of `(owner, name, version)` and of `(version, filename,
//! composite key)` must be enforced atomically, so two concurrent publishes of
//! the same version yield exactly one success and one
//! [`RepositoryError::DuplicateVersion`].
//!
//! Writes are atomic per file. Nothing here spans several files in one
//! transaction; callers that attach several files to a version do so one
//! call at a time.
//!
//! ```text
//! PackageRepository (trait)
//!     ├── MemoryRepository  (process-local)
//!     └── LocalRepository   (blob files + JSON index under a data directory)
//! ```

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::buffer::HashedBuffer;
use crate::hash_utils::HashSummary;
use crate::types::{Owner, PackageType};

mod index;
mod local;
mod memory;

pub use index::RepositoryIndex;
pub use local::LocalRepository;
pub use memory::MemoryRepository;

/// Storage-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("package does not exist")]
    PackageNotFound,

    #[error("package version does not exist")]
    VersionNotFound,

    #[error("package file does not exist")]
    FileNotFound,

    #[error("package version already exists")]
    DuplicateVersion,

    #[error("package file already exists")]
    DuplicateFile,

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage index error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage failure: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Byte stream of one stored file.
pub type FileStream = Pin<Box<dyn AsyncRead + Send>>;

/// A package line: created implicitly with its first version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: u64,
    pub owner: Owner,
    pub package_type: PackageType,
    pub name: String,
    pub lower_name: String,
    pub created_at: DateTime<Utc>,
}

/// One published version of a [`Package`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: u64,
    pub package_id: u64,
    pub version: String,
    pub lower_version: String,
    /// Ecosystem-specific manifest metadata
    pub metadata: serde_json::Value,
    pub creator: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored blob attached to a [`PackageVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    pub id: u64,
    pub version_id: u64,
    /// Lowercased file name
    pub name: String,
    pub size: u64,
    pub hashes: HashSummary,
    pub is_lead: bool,
    pub composite_key: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Addresses one version of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub owner: Owner,
    pub package_type: PackageType,
    pub name: String,
    pub version: String,
}

/// Everything needed to create a new version.
#[derive(Debug, Clone)]
pub struct PackageCreation {
    pub info: PackageInfo,
    pub creator: Option<String>,
    pub metadata: serde_json::Value,
}

/// Name and optional composite key of a file within a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFileInfo {
    pub filename: String,
    pub composite_key: Option<String>,
}

impl PackageFileInfo {
    pub fn new(filename: impl Into<String>) -> Self {
        PackageFileInfo {
            filename: filename.into().to_lowercase(),
            composite_key: None,
        }
    }

    pub fn with_composite_key(mut self, key: impl Into<String>) -> Self {
        self.composite_key = Some(key.into().to_lowercase());
        self
    }
}

/// A file about to be stored, with its staged content.
pub struct NewPackageFile<'a> {
    pub info: PackageFileInfo,
    pub data: &'a mut HashedBuffer,
    pub is_lead: bool,
    pub properties: BTreeMap<String, String>,
}

/// File metadata as recorded in the index once content has been staged.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub info: PackageFileInfo,
    pub size: u64,
    pub hashes: HashSummary,
    pub is_lead: bool,
    pub properties: BTreeMap<String, String>,
}

impl NewPackageFile<'_> {
    pub fn staged(&self) -> StagedFile {
        StagedFile {
            info: self.info.clone(),
            size: self.data.size(),
            hashes: self.data.hashes().clone(),
            is_lead: self.is_lead,
            properties: self.properties.clone(),
        }
    }
}

/// Paged, case-insensitive substring search over package names.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub owner: Owner,
    pub package_type: PackageType,
    pub query: String,
    pub skip: usize,
    pub take: usize,
}

/// Property-based file lookup across all packages of an owner.
#[derive(Debug, Clone)]
pub struct FileSearchOptions {
    pub owner: Owner,
    pub package_type: PackageType,
    pub filename: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Storage collaborator consumed by the orchestrators.
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Create a version (and its package, if new) together with its lead file.
    ///
    /// Fails with [`RepositoryError::DuplicateVersion`] when
    /// `(owner, name, version)` already exists.
    async fn create_version_with_file(
        &self,
        creation: &PackageCreation,
        file: NewPackageFile<'_>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)>;

    /// Attach a file to an existing version.
    ///
    /// Fails with [`RepositoryError::VersionNotFound`] when the version is
    /// missing and [`RepositoryError::DuplicateFile`] when
    /// `(version, filename, composite key)` already exists.
    async fn add_file_to_version(
        &self,
        info: &PackageInfo,
        file: NewPackageFile<'_>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)>;

    async fn get_package(&self, package_id: u64) -> RepositoryResult<Package>;

    /// All versions of a package line, empty when the package is unknown.
    async fn find_versions_by_name(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
    ) -> RepositoryResult<Vec<PackageVersion>>;

    async fn find_version_by_name_and_version(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RepositoryResult<PackageVersion>;

    /// Matching versions for one page plus the total number of matches.
    async fn search_versions(
        &self,
        options: &SearchOptions,
    ) -> RepositoryResult<(Vec<PackageVersion>, u64)>;

    async fn list_files(&self, version_id: u64) -> RepositoryResult<Vec<PackageFile>>;

    async fn find_file(
        &self,
        version_id: u64,
        file: &PackageFileInfo,
    ) -> RepositoryResult<PackageFile>;

    async fn find_files_by_property(
        &self,
        options: &FileSearchOptions,
    ) -> RepositoryResult<Vec<PackageFile>>;

    async fn open_file(&self, file: &PackageFile) -> RepositoryResult<FileStream>;

    /// Hard delete of one version and its files.
    async fn remove_version(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RepositoryResult<()>;
}
