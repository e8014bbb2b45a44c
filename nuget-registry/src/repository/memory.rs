//! Process-local repository
//!
//! Keeps the index and blob contents in memory behind a single mutex. The
//! lock is never held across an await point: file content is read out of the
//! staging buffer before the lock is taken.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::debug;

use super::{
    FileSearchOptions, FileStream, NewPackageFile, Package, PackageCreation, PackageFile,
    PackageFileInfo, PackageInfo, PackageRepository, PackageVersion, RepositoryError,
    RepositoryIndex, RepositoryResult, SearchOptions,
};
use crate::types::{Owner, PackageType};

#[derive(Default)]
struct Inner {
    index: RepositoryIndex,
    blobs: HashMap<String, Bytes>,
}

/// In-memory [`PackageRepository`].
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Storage("repository lock poisoned".to_string()))
    }

    /// Number of distinct blobs currently held.
    pub fn blob_count(&self) -> usize {
        self.lock().map(|inner| inner.blobs.len()).unwrap_or(0)
    }
}

fn info_for(owner: &Owner, package_type: PackageType, name: &str, version: &str) -> PackageInfo {
    PackageInfo {
        owner: owner.clone(),
        package_type,
        name: name.to_string(),
        version: version.to_string(),
    }
}

#[async_trait]
impl PackageRepository for MemoryRepository {
    async fn create_version_with_file(
        &self,
        creation: &PackageCreation,
        file: NewPackageFile<'_>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)> {
        let staged = file.staged();
        let content = Bytes::from(file.data.read_all()?);

        let mut inner = self.lock()?;
        let (version, stored) = inner
            .index
            .create_version_with_file(creation, staged, Utc::now())?;
        inner
            .blobs
            .entry(stored.hashes.sha256.clone())
            .or_insert(content);

        debug!(
            package = %creation.info.name,
            version = %version.version,
            file = %stored.name,
            "Stored version in memory"
        );
        Ok((version, stored))
    }

    async fn add_file_to_version(
        &self,
        info: &PackageInfo,
        file: NewPackageFile<'_>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)> {
        let staged = file.staged();
        let content = Bytes::from(file.data.read_all()?);

        let mut inner = self.lock()?;
        let (version, stored) = inner.index.add_file(info, staged, Utc::now())?;
        inner
            .blobs
            .entry(stored.hashes.sha256.clone())
            .or_insert(content);

        debug!(
            package = %info.name,
            version = %version.version,
            file = %stored.name,
            "Stored file in memory"
        );
        Ok((version, stored))
    }

    async fn get_package(&self, package_id: u64) -> RepositoryResult<Package> {
        self.lock()?.index.package(package_id).cloned()
    }

    async fn find_versions_by_name(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
    ) -> RepositoryResult<Vec<PackageVersion>> {
        let inner = self.lock()?;
        Ok(inner
            .index
            .find_package(owner, package_type, name)
            .map(|p| inner.index.versions_of(p.id))
            .unwrap_or_default())
    }

    async fn find_version_by_name_and_version(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RepositoryResult<PackageVersion> {
        self.lock()?
            .index
            .find_version(&info_for(owner, package_type, name, version))
            .cloned()
    }

    async fn search_versions(
        &self,
        options: &SearchOptions,
    ) -> RepositoryResult<(Vec<PackageVersion>, u64)> {
        Ok(self.lock()?.index.search_versions(options))
    }

    async fn list_files(&self, version_id: u64) -> RepositoryResult<Vec<PackageFile>> {
        Ok(self.lock()?.index.files_of(version_id))
    }

    async fn find_file(
        &self,
        version_id: u64,
        file: &PackageFileInfo,
    ) -> RepositoryResult<PackageFile> {
        self.lock()?.index.find_file(version_id, file)
    }

    async fn find_files_by_property(
        &self,
        options: &FileSearchOptions,
    ) -> RepositoryResult<Vec<PackageFile>> {
        Ok(self.lock()?.index.find_files_by_property(options))
    }

    async fn open_file(&self, file: &PackageFile) -> RepositoryResult<FileStream> {
        let content = self
            .lock()?
            .blobs
            .get(&file.hashes.sha256)
            .cloned()
            .ok_or(RepositoryError::FileNotFound)?;
        Ok(Box::pin(Cursor::new(content)))
    }

    async fn remove_version(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RepositoryResult<()> {
        let mut inner = self.lock()?;
        let removed = inner
            .index
            .remove_version(&info_for(owner, package_type, name, version))?;

        for file in removed {
            if !inner.index.blob_in_use(&file.hashes.sha256) {
                inner.blobs.remove(&file.hashes.sha256);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HashedBuffer;
    use std::collections::BTreeMap;
    use tokio::io::AsyncReadExt;

    fn creation(version: &str) -> PackageCreation {
        PackageCreation {
            info: info_for(
                &Owner::new("acme").unwrap(),
                PackageType::NuGet,
                "Foo",
                version,
            ),
            creator: Some("alice".to_string()),
            metadata: serde_json::json!({"description": "test"}),
        }
    }

    #[tokio::test]
    async fn test_store_and_read_back() {
        let repo = MemoryRepository::new();
        let mut data = HashedBuffer::from_bytes(b"nupkg bytes".to_vec());
        let (version, file) = repo
            .create_version_with_file(
                &creation("1.0.0"),
                NewPackageFile {
                    info: PackageFileInfo::new("Foo.1.0.0.nupkg"),
                    data: &mut data,
                    is_lead: true,
                    properties: BTreeMap::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(file.name, "foo.1.0.0.nupkg");
        assert_eq!(version.creator.as_deref(), Some("alice"));

        let mut stream = repo.open_file(&file).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"nupkg bytes");

        let owner = Owner::new("acme").unwrap();
        repo.remove_version(&owner, PackageType::NuGet, "foo", "1.0.0")
            .await
            .unwrap();
        assert_eq!(repo.blob_count(), 0);
        assert!(repo
            .find_versions_by_name(&owner, PackageType::NuGet, "foo")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_publish_has_one_winner() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let mut data = HashedBuffer::from_bytes(b"same".to_vec());
                repo.create_version_with_file(
                    &creation("1.0.0"),
                    NewPackageFile {
                        info: PackageFileInfo::new("foo.1.0.0.nupkg"),
                        data: &mut data,
                        is_lead: true,
                        properties: BTreeMap::new(),
                    },
                )
                .await
                .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
