//! Retrieval orchestration
//!
//! Resolves download, listing, search and delete requests against the
//! repository. Listing paths project stored versions into
//! [`PackageDescriptor`]s and hand them to the response builders.
//!
//! An unknown package line is a not-found condition; a search that matches
//! nothing is a successful empty result.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::response::{
    self, LinkBuilder, PackageVersionsResponse, RegistrationIndexResponse,
    RegistrationLeafResponse, SearchResultResponse,
};
use super::{Metadata, PackageDescriptor, PROPERTY_SYMBOL_ID};
use crate::error::{AppError, AppResult};
use crate::repository::{
    FileSearchOptions, FileStream, Package, PackageFile, PackageFileInfo, PackageRepository,
    PackageVersion, SearchOptions,
};
use crate::types::{Owner, PackageType};
use crate::version::NuGetVersion;

/// An opened stored file.
pub struct Download {
    pub file: PackageFile,
    pub stream: FileStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download").field("file", &self.file).finish()
    }
}

/// Search parameters as received from the client.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    pub skip: usize,
    pub take: usize,
}

/// Open `filename` of one version.
pub async fn download_package_file(
    repository: &dyn PackageRepository,
    owner: &Owner,
    name: &str,
    version: &str,
    filename: &str,
) -> AppResult<Download> {
    let pv = repository
        .find_version_by_name_and_version(owner, PackageType::NuGet, name, version)
        .await?;
    let file = repository
        .find_file(pv.id, &PackageFileInfo::new(filename))
        .await?;
    let stream = repository.open_file(&file).await?;

    debug!(package = %name, version = %version, file = %file.name, "Serving package file");
    Ok(Download { file, stream })
}

/// Open a PDB by file name and symbol id.
///
/// Symbol clients repeat the file name around the id; both occurrences must
/// agree before any lookup happens, and only an unambiguous match is served.
pub async fn download_symbol_file(
    repository: &dyn PackageRepository,
    owner: &Owner,
    filename: &str,
    symbol_id: &str,
    filename2: &str,
) -> AppResult<Download> {
    if filename != filename2 {
        return Err(AppError::BadRequest(format!(
            "symbol file names do not match: '{filename}' and '{filename2}'"
        )));
    }

    let mut properties = BTreeMap::new();
    properties.insert(PROPERTY_SYMBOL_ID.to_string(), symbol_id.to_lowercase());

    let mut files = repository
        .find_files_by_property(&FileSearchOptions {
            owner: owner.clone(),
            package_type: PackageType::NuGet,
            filename: Some(filename.to_lowercase()),
            properties,
        })
        .await?;

    if files.len() != 1 {
        debug!(
            filename = %filename,
            id = %symbol_id,
            matches = files.len(),
            "Symbol lookup not unique"
        );
        return Err(AppError::NotFound(format!(
            "symbol file {filename} with id {symbol_id} not found"
        )));
    }

    let file = files.remove(0);
    let stream = repository.open_file(&file).await?;
    Ok(Download { file, stream })
}

/// Join versions with their packages, files and parsed metadata.
pub async fn load_descriptors(
    repository: &dyn PackageRepository,
    versions: Vec<PackageVersion>,
) -> AppResult<Vec<PackageDescriptor>> {
    let mut packages: HashMap<u64, Package> = HashMap::new();
    let mut descriptors = Vec::with_capacity(versions.len());

    for version in versions {
        let package = match packages.get(&version.package_id) {
            Some(package) => package.clone(),
            None => {
                let package = repository.get_package(version.package_id).await?;
                packages.insert(package.id, package.clone());
                package
            }
        };
        let files = repository.list_files(version.id).await?;
        descriptors.push(descriptor(package, version, files)?);
    }

    Ok(descriptors)
}

fn descriptor(
    package: Package,
    version: PackageVersion,
    files: Vec<PackageFile>,
) -> AppResult<PackageDescriptor> {
    let semver = NuGetVersion::parse(&version.version).map_err(|e| {
        AppError::InternalError(format!("stored version of {} is invalid: {e}", package.name))
    })?;
    let metadata: Metadata = serde_json::from_value(version.metadata.clone()).map_err(|e| {
        AppError::InternalError(format!("stored metadata of {} is invalid: {e}", package.name))
    })?;

    Ok(PackageDescriptor {
        package,
        version,
        semver,
        metadata,
        files,
    })
}

async fn package_descriptors(
    repository: &dyn PackageRepository,
    owner: &Owner,
    name: &str,
) -> AppResult<Vec<PackageDescriptor>> {
    let versions = repository
        .find_versions_by_name(owner, PackageType::NuGet, name)
        .await?;
    if versions.is_empty() {
        return Err(AppError::NotFound(format!("package {name} not found")));
    }
    load_descriptors(repository, versions).await
}

/// Flat list of every version of a package.
pub async fn list_versions(
    repository: &dyn PackageRepository,
    owner: &Owner,
    name: &str,
) -> AppResult<PackageVersionsResponse> {
    let descriptors = package_descriptors(repository, owner, name).await?;
    Ok(response::package_versions(&descriptors))
}

/// Paged registration index of a package.
pub async fn registration_index(
    repository: &dyn PackageRepository,
    links: &LinkBuilder,
    owner: &Owner,
    name: &str,
    page_size: usize,
) -> AppResult<RegistrationIndexResponse> {
    let descriptors = package_descriptors(repository, owner, name).await?;
    let display_name = descriptors
        .first()
        .map(|pd| pd.package.name.clone())
        .unwrap_or_else(|| name.to_string());
    Ok(response::registration_index(
        links,
        &display_name,
        &descriptors,
        page_size,
    ))
}

/// Registration leaf of a single version.
pub async fn registration_leaf(
    repository: &dyn PackageRepository,
    links: &LinkBuilder,
    owner: &Owner,
    name: &str,
    version: &str,
) -> AppResult<RegistrationLeafResponse> {
    let pv = repository
        .find_version_by_name_and_version(owner, PackageType::NuGet, name, version)
        .await?;
    let mut descriptors = load_descriptors(repository, vec![pv]).await?;
    let pd = descriptors
        .pop()
        .ok_or_else(|| AppError::NotFound(format!("package {name} {version} not found")))?;
    Ok(response::registration_leaf(links, &pd))
}

/// Search package names; an empty result is not an error.
pub async fn search(
    repository: &dyn PackageRepository,
    links: &LinkBuilder,
    owner: &Owner,
    query: &SearchQuery,
) -> AppResult<SearchResultResponse> {
    let (versions, total_hits) = repository
        .search_versions(&SearchOptions {
            owner: owner.clone(),
            package_type: PackageType::NuGet,
            query: query.query.clone(),
            skip: query.skip,
            take: query.take,
        })
        .await?;

    let descriptors = load_descriptors(repository, versions).await?;
    debug!(
        query = %query.query,
        total = total_hits,
        returned = descriptors.len(),
        "Search completed"
    );
    Ok(response::search_result(links, total_hits, &descriptors))
}

/// Hard delete of one version.
pub async fn delete_package(
    repository: &dyn PackageRepository,
    owner: &Owner,
    name: &str,
    version: &str,
) -> AppResult<()> {
    repository
        .remove_version(owner, PackageType::NuGet, name, version)
        .await?;
    info!(owner = %owner, package = %name, version = %version, "Package version deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HashedBuffer;
    use crate::config::LimitsConfig;
    use crate::error::ErrorCode;
    use crate::nuget::metadata::test_support::nupkg;
    use crate::nuget::upload::publish_package;
    use crate::repository::MemoryRepository;
    use tokio::io::AsyncReadExt;

    fn owner() -> Owner {
        Owner::new("acme").unwrap()
    }

    fn links() -> LinkBuilder {
        LinkBuilder::new("http://localhost/api/packages/acme/nuget")
    }

    async fn publish(repo: &MemoryRepository, id: &str, version: &str) -> Vec<u8> {
        let bytes = nupkg(id, version);
        publish_package(
            repo,
            &LimitsConfig::default(),
            &owner(),
            None,
            HashedBuffer::from_bytes(bytes.clone()),
        )
        .await
        .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_download_round_trip() {
        let repo = MemoryRepository::new();
        let bytes = publish(&repo, "Foo", "1.0.0").await;

        let mut download = download_package_file(&repo, &owner(), "foo", "1.0.0", "Foo.1.0.0.nupkg")
            .await
            .unwrap();
        let mut out = Vec::new();
        download.stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, bytes);
        assert!(download.file.is_lead);

        let err = download_package_file(&repo, &owner(), "foo", "1.0.0", "other.nupkg")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_symbol_filename_mismatch_is_rejected_first() {
        let repo = MemoryRepository::new();
        let err = download_symbol_file(&repo, &owner(), "a.pdb", "abc", "b.pdb")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MalformedInput);

        let err = download_symbol_file(&repo, &owner(), "a.pdb", "abc", "a.pdb")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_package_is_not_found_but_empty_search_is_ok() {
        let repo = MemoryRepository::new();
        let err = list_versions(&repo, &owner(), "missing").await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);

        let err = registration_index(&repo, &links(), &owner(), "missing", 64)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);

        let result = search(
            &repo,
            &links(),
            &owner(),
            &SearchQuery {
                query: "missing".to_string(),
                skip: 0,
                take: 20,
            },
        )
        .await
        .unwrap();
        assert_eq!(result.total_hits, 0);
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_listing_and_registration() {
        let repo = MemoryRepository::new();
        publish(&repo, "Foo", "2.0.0").await;
        publish(&repo, "Foo", "1.0.0-Beta").await;
        publish(&repo, "Foo", "1.0.0").await;

        let versions = list_versions(&repo, &owner(), "FOO").await.unwrap();
        assert_eq!(versions.versions, vec!["1.0.0-beta", "1.0.0", "2.0.0"]);

        let index = registration_index(&repo, &links(), &owner(), "foo", 64)
            .await
            .unwrap();
        assert_eq!(index.count, 1);
        assert_eq!(index.items[0].lower, "1.0.0-Beta");
        assert_eq!(index.items[0].upper, "2.0.0");
        assert!(index.registration_index_url.ends_with("/registration/Foo/index.json"));

        let leaf = registration_leaf(&repo, &links(), &owner(), "foo", "1.0")
            .await
            .unwrap();
        assert_eq!(leaf.catalog_entry.version, "1.0.0");
        assert_eq!(leaf.catalog_entry.description, "Test package");
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let repo = MemoryRepository::new();
        publish(&repo, "Foo", "1.0.0").await;

        delete_package(&repo, &owner(), "Foo", "1.0.0").await.unwrap();
        let err = delete_package(&repo, &owner(), "Foo", "1.0.0")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);

        let err = download_package_file(&repo, &owner(), "Foo", "1.0.0", "foo.1.0.0.nupkg")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }
}
