//! Filesystem-backed repository
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/nuget/
//!     index.json              packages, versions and file records
//!     blobs/ab/cd/<sha256>    content-addressed file bodies
//! ```
//!
//! Every mutation holds the index lock from the uniqueness check until the
//! index has been written back, so concurrent publishes of one version are
//! serialised. Blobs and the index are written to a temporary sibling and
//! renamed into place.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    FileSearchOptions, FileStream, NewPackageFile, Package, PackageCreation, PackageFile,
    PackageFileInfo, PackageInfo, PackageRepository, PackageVersion, RepositoryError,
    RepositoryIndex, RepositoryResult, SearchOptions,
};
use crate::buffer::HashedBuffer;
use crate::types::{Owner, PackageType};

const INDEX_FILE: &str = "index.json";
const COPY_CHUNK: usize = 64 * 1024;

/// [`PackageRepository`] persisting to a local data directory.
pub struct LocalRepository {
    root: PathBuf,
    index: Mutex<RepositoryIndex>,
}

impl LocalRepository {
    /// Open (or initialise) the repository under `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> RepositoryResult<Self> {
        let root = data_dir.as_ref().join("nuget");
        fs::create_dir_all(root.join("blobs")).await?;

        let index_path = root.join(INDEX_FILE);
        let index = match fs::read(&index_path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %index_path.display(), "No index found, starting empty");
                RepositoryIndex::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(root = %root.display(), "Opened local package repository");
        Ok(LocalRepository {
            root,
            index: Mutex::new(index),
        })
    }

    fn blob_path(&self, sha256: &str) -> RepositoryResult<PathBuf> {
        if sha256.len() < 4 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RepositoryError::Storage(format!(
                "invalid blob digest: {sha256}"
            )));
        }
        Ok(self
            .root
            .join("blobs")
            .join(&sha256[0..2])
            .join(&sha256[2..4])
            .join(sha256))
    }

    async fn write_blob(&self, sha256: &str, data: &mut HashedBuffer) -> RepositoryResult<()> {
        let path = self.blob_path(sha256)?;
        if fs::try_exists(&path).await? {
            debug!(blob = %sha256, "Blob already present");
            return Ok(());
        }

        let tmp = staging_path(&path).await?;
        if let Err(e) = copy_to_file(data, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        rename_into_place(&tmp, &path).await?;
        debug!(path = %path.display(), size = data.size(), "Blob written");
        Ok(())
    }

    async fn delete_blob(&self, sha256: &str) {
        let Ok(path) = self.blob_path(sha256) else {
            return;
        };
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(blob = %sha256, error = %e, "Failed to delete blob");
            }
        }
    }

    async fn persist(&self, index: &RepositoryIndex) -> RepositoryResult<()> {
        let raw = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.root.join(INDEX_FILE), &raw).await
    }

    /// Apply `mutate` to the locked index and write it back, restoring the
    /// previous state when the write fails.
    async fn commit<T>(
        &self,
        index: &mut RepositoryIndex,
        mutate: impl FnOnce(&mut RepositoryIndex) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let snapshot = index.clone();
        let result = mutate(index)?;
        if let Err(e) = self.persist(index).await {
            *index = snapshot;
            return Err(e);
        }
        Ok(result)
    }
}

/// Temporary sibling of `path`, with the parent directory created.
async fn staging_path(path: &Path) -> RepositoryResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(path.with_file_name(format!(".{file_name}.tmp")))
}

async fn rename_into_place(tmp: &Path, path: &Path) -> RepositoryResult<()> {
    if let Err(e) = fs::rename(tmp, path).await {
        let _ = fs::remove_file(tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Write `content` to a temporary sibling of `path` and rename it into place.
async fn write_atomic(path: &Path, content: &[u8]) -> RepositoryResult<()> {
    let tmp = staging_path(path).await?;
    fs::write(&tmp, content).await?;
    rename_into_place(&tmp, path).await?;
    debug!(path = %path.display(), size = content.len(), "File written");
    Ok(())
}

/// Copy a staging buffer from offset zero into `dest` chunk by chunk,
/// leaving the buffer rewound.
async fn copy_to_file(data: &mut HashedBuffer, dest: &Path) -> RepositoryResult<()> {
    data.rewind()?;
    let mut out = fs::File::create(dest).await?;
    let mut chunk = vec![0u8; COPY_CHUNK];
    loop {
        let n = data.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n]).await?;
    }
    out.flush().await?;
    data.rewind()?;
    Ok(())
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
impl PackageRepository for LocalRepository {
    async fn create_version_with_file(
        &self,
        creation: &PackageCreation,
        file: NewPackageFile<'_>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)> {
        let staged = file.staged();

        let mut index = self.index.lock().await;
        index.check_create(creation)?;
        self.write_blob(&staged.hashes.sha256, file.data).await?;

        let (version, stored) = self
            .commit(&mut index, |index| {
                index.create_version_with_file(creation, staged, Utc::now())
            })
            .await?;

        info!(
            owner = %creation.info.owner,
            package = %creation.info.name,
            version = %version.version,
            file = %stored.name,
            "Package version stored"
        );
        Ok((version, stored))
    }

    async fn add_file_to_version(
        &self,
        info: &PackageInfo,
        file: NewPackageFile<'_>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)> {
        let staged = file.staged();

        let mut index = self.index.lock().await;
        index.check_add(info, &staged.info)?;
        self.write_blob(&staged.hashes.sha256, file.data).await?;

        let (version, stored) = self
            .commit(&mut index, |index| index.add_file(info, staged, Utc::now()))
            .await?;

        info!(
            owner = %info.owner,
            package = %info.name,
            version = %version.version,
            file = %stored.name,
            "Package file stored"
        );
        Ok((version, stored))
    }

    async fn get_package(&self, package_id: u64) -> RepositoryResult<Package> {
        self.index.lock().await.package(package_id).cloned()
    }

    async fn find_versions_by_name(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
    ) -> RepositoryResult<Vec<PackageVersion>> {
        let index = self.index.lock().await;
        Ok(index
            .find_package(owner, package_type, name)
            .map(|p| index.versions_of(p.id))
            .unwrap_or_default())
    }

    async fn find_version_by_name_and_version(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RepositoryResult<PackageVersion> {
        self.index
            .lock()
            .await
            .find_version(&info_for(owner, package_type, name, version))
            .cloned()
    }

    async fn search_versions(
        &self,
        options: &SearchOptions,
    ) -> RepositoryResult<(Vec<PackageVersion>, u64)> {
        Ok(self.index.lock().await.search_versions(options))
    }

    async fn list_files(&self, version_id: u64) -> RepositoryResult<Vec<PackageFile>> {
        Ok(self.index.lock().await.files_of(version_id))
    }

    async fn find_file(
        &self,
        version_id: u64,
        file: &PackageFileInfo,
    ) -> RepositoryResult<PackageFile> {
        self.index.lock().await.find_file(version_id, file)
    }

    async fn find_files_by_property(
        &self,
        options: &FileSearchOptions,
    ) -> RepositoryResult<Vec<PackageFile>> {
        Ok(self.index.lock().await.find_files_by_property(options))
    }

    async fn open_file(&self, file: &PackageFile) -> RepositoryResult<FileStream> {
        let path = self.blob_path(&file.hashes.sha256)?;
        match fs::File::open(&path).await {
            Ok(handle) => Ok(Box::pin(handle)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    file = %file.name,
                    "Blob missing for indexed file"
                );
                Err(RepositoryError::FileNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_version(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
        version: &str,
    ) -> RepositoryResult<()> {
        let info = info_for(owner, package_type, name, version);
        let mut index = self.index.lock().await;
        let removed = self
            .commit(&mut index, |index| index.remove_version(&info))
            .await?;

        for file in &removed {
            if !index.blob_in_use(&file.hashes.sha256) {
                self.delete_blob(&file.hashes.sha256).await;
            }
        }

        info!(
            owner = %owner,
            package = %name,
            version = %version,
            files = removed.len(),
            "Package version removed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HashedBufferWriter;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn owner() -> Owner {
        Owner::new("acme").unwrap()
    }

    fn creation(version: &str) -> PackageCreation {
        PackageCreation {
            info: info_for(&owner(), PackageType::NuGet, "Foo", version),
            creator: None,
            metadata: serde_json::json!({"description": "local"}),
        }
    }

    async fn store(
        repo: &LocalRepository,
        version: &str,
        body: &[u8],
    ) -> RepositoryResult<PackageFile> {
        let mut data = HashedBuffer::from_bytes(body.to_vec());
        store_buffer(repo, version, &mut data).await
    }

    async fn store_buffer(
        repo: &LocalRepository,
        version: &str,
        data: &mut HashedBuffer,
    ) -> RepositoryResult<PackageFile> {
        repo.create_version_with_file(
            &creation(version),
            NewPackageFile {
                info: PackageFileInfo::new(format!("foo.{version}.nupkg")),
                data,
                is_lead: true,
                properties: BTreeMap::new(),
            },
        )
        .await
        .map(|(_, file)| file)
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let repo = LocalRepository::open(temp_dir.path()).await.unwrap();
            store(&repo, "1.0.0", b"first").await.unwrap();
        }

        let repo = LocalRepository::open(temp_dir.path()).await.unwrap();
        let versions = repo
            .find_versions_by_name(&owner(), PackageType::NuGet, "FOO")
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);

        let files = repo.list_files(versions[0].id).await.unwrap();
        let mut stream = repo.open_file(&files[0]).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"first");
    }

    #[tokio::test]
    async fn test_blob_layout_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).await.unwrap();
        let file = store(&repo, "1.0.0", b"blob").await.unwrap();

        let sha = &file.hashes.sha256;
        let blob = temp_dir
            .path()
            .join("nuget/blobs")
            .join(&sha[0..2])
            .join(&sha[2..4])
            .join(sha);
        assert!(blob.exists());

        repo.remove_version(&owner(), PackageType::NuGet, "foo", "1.0.0")
            .await
            .unwrap();
        assert!(!blob.exists());
    }

    #[tokio::test]
    async fn test_shared_blob_kept_while_referenced() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).await.unwrap();
        let first = store(&repo, "1.0.0", b"same").await.unwrap();
        store(&repo, "2.0.0", b"same").await.unwrap();

        repo.remove_version(&owner(), PackageType::NuGet, "foo", "1.0.0")
            .await
            .unwrap();
        assert!(repo.open_file(&first).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).await.unwrap();
        store(&repo, "1.0.0", b"a").await.unwrap();

        let err = store(&repo, "1.0", b"b").await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateVersion));
    }

    #[tokio::test]
    async fn test_spilled_buffer_streams_into_blob() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::open(temp_dir.path()).await.unwrap();

        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = HashedBufferWriter::new(1024 * 1024, 4096);
        for chunk in body.chunks(10_000) {
            writer.append(chunk).unwrap();
        }
        let mut data = writer.finish().unwrap();
        assert!(data.is_spilled());

        let file = store_buffer(&repo, "1.0.0", &mut data).await.unwrap();
        assert_eq!(file.size, body.len() as u64);

        let mut stream = repo.open_file(&file).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, body);

        // the staging buffer is left rewound for the caller
        assert_eq!(data.read_all().unwrap(), body);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_publish_has_one_winner() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Arc::new(LocalRepository::open(temp_dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                store(&repo, "1.0.0", b"same").await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);

        let reopened = LocalRepository::open(temp_dir.path()).await.unwrap();
        let versions = reopened
            .find_versions_by_name(&owner(), PackageType::NuGet, "foo")
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }
}
