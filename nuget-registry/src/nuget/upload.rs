//! Upload orchestration
//!
//! Two entry points share one extraction step:
//!
//! ```text
//! publish_package:        buffer ─► manifest ─► rewind ─► version + .nupkg
//! publish_symbol_package: buffer ─► manifest ─► PDBs ─► rewind ─► .snupkg ─► PDBs
//! ```
//!
//! Every file write is its own repository call. The PDB loop stops at the
//! first failure and keeps the files stored before it; callers see the
//! failing call's error. Staging buffers are owned values, so every exit
//! path (including a dropped request future) releases them.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::{
    extract_portable_pdbs, parse_package_metadata, ParsedPackage, PROPERTY_SYMBOL_ID,
};
use crate::buffer::{HashedBuffer, HashedBufferWriter};
use crate::config::LimitsConfig;
use crate::error::{AppError, AppResult};
use crate::repository::{
    NewPackageFile, PackageCreation, PackageFileInfo, PackageInfo, PackageRepository,
};
use crate::types::{Owner, PackageKind, PackageType};

/// Result of a symbol package upload.
#[derive(Debug)]
pub struct SymbolUpload {
    pub package: ParsedPackage,
    /// Ids of the stored PDBs, in archive order
    pub symbol_ids: Vec<String>,
}

/// Drain a body stream into a bounded staging buffer.
pub async fn buffer_upload<S, E>(stream: S, limits: &LimitsConfig) -> AppResult<HashedBuffer>
where
    S: Stream<Item = Result<Bytes, E>>,
    AppError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let mut writer = HashedBufferWriter::new(limits.max_upload_size, limits.memory_threshold);

    while let Some(chunk) = stream.next().await {
        writer.append(&chunk?)?;
    }

    debug!(size = writer.size(), "Upload buffered");
    writer.finish()
}

/// Parse the manifest of a staged archive and rewind it for persistence.
fn extract(
    data: &mut HashedBuffer,
    expected: PackageKind,
    limits: &LimitsConfig,
) -> AppResult<ParsedPackage> {
    let parsed = parse_package_metadata(&mut *data, expected, limits.max_manifest_size)?;
    data.rewind()?;
    Ok(parsed)
}

fn package_info(owner: &Owner, parsed: &ParsedPackage) -> PackageInfo {
    PackageInfo {
        owner: owner.clone(),
        package_type: PackageType::NuGet,
        name: parsed.id.clone(),
        version: parsed.version.clone(),
    }
}

/// Publish an ordinary package: creates the version and its lead file.
pub async fn publish_package(
    repository: &dyn PackageRepository,
    limits: &LimitsConfig,
    owner: &Owner,
    creator: Option<String>,
    mut data: HashedBuffer,
) -> AppResult<ParsedPackage> {
    let parsed = extract(&mut data, PackageKind::Dependency, limits)?;

    let creation = PackageCreation {
        info: package_info(owner, &parsed),
        creator,
        metadata: serde_json::to_value(&parsed.metadata)?,
    };

    repository
        .create_version_with_file(
            &creation,
            NewPackageFile {
                info: PackageFileInfo::new(parsed.file_name()),
                data: &mut data,
                is_lead: true,
                properties: BTreeMap::new(),
            },
        )
        .await?;

    info!(
        owner = %owner,
        package = %parsed.id,
        version = %parsed.version,
        size = data.size(),
        "Package published"
    );
    Ok(parsed)
}

/// Publish a symbol package and each PDB it carries to an existing version.
pub async fn publish_symbol_package(
    repository: &dyn PackageRepository,
    limits: &LimitsConfig,
    owner: &Owner,
    mut data: HashedBuffer,
) -> AppResult<SymbolUpload> {
    let parsed = extract(&mut data, PackageKind::Symbols, limits)?;
    let pdbs = extract_portable_pdbs(&mut data, limits)?;
    data.rewind()?;

    let info = package_info(owner, &parsed);

    repository
        .add_file_to_version(
            &info,
            NewPackageFile {
                info: PackageFileInfo::new(parsed.file_name()),
                data: &mut data,
                is_lead: false,
                properties: BTreeMap::new(),
            },
        )
        .await?;
    drop(data);

    let mut symbol_ids = Vec::with_capacity(pdbs.len());
    for mut pdb in pdbs {
        let mut properties = BTreeMap::new();
        properties.insert(PROPERTY_SYMBOL_ID.to_string(), pdb.id.clone());

        let stored = repository
            .add_file_to_version(
                &info,
                NewPackageFile {
                    info: PackageFileInfo::new(&pdb.name).with_composite_key(&pdb.id),
                    data: &mut pdb.content,
                    is_lead: false,
                    properties,
                },
            )
            .await;

        if let Err(e) = stored {
            warn!(
                package = %parsed.id,
                version = %parsed.version,
                symbol = %pdb.name,
                id = %pdb.id,
                stored = symbol_ids.len(),
                error = %e,
                "Symbol upload stopped; earlier symbol files remain stored"
            );
            return Err(e.into());
        }

        debug!(symbol = %pdb.name, id = %pdb.id, "Symbol file stored");
        symbol_ids.push(pdb.id);
    }

    info!(
        owner = %owner,
        package = %parsed.id,
        version = %parsed.version,
        symbols = symbol_ids.len(),
        "Symbol package published"
    );
    Ok(SymbolUpload {
        package: parsed,
        symbol_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::nuget::metadata::test_support::{build_zip, nupkg, nuspec};
    use crate::nuget::symbols::test_support::{portable_pdb, GUID, GUID_ID};
    use crate::repository::{FileSearchOptions, MemoryRepository};

    fn owner() -> Owner {
        Owner::new("acme").unwrap()
    }

    fn buffer(data: Vec<u8>) -> HashedBuffer {
        HashedBuffer::from_bytes(data)
    }

    fn snupkg(id: &str, version: &str, pdbs: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let manifest = nuspec(id, version, true);
        let manifest_name = format!("{id}.nuspec");
        let mut entries: Vec<(&str, &[u8])> = vec![(manifest_name.as_str(), manifest.as_bytes())];
        for (name, content) in pdbs {
            entries.push((*name, content.as_slice()));
        }
        build_zip(&entries)
    }

    #[tokio::test]
    async fn test_buffer_upload_enforces_limit() {
        let limits = LimitsConfig {
            max_upload_size: 4,
            ..LimitsConfig::default()
        };
        let chunks: Vec<Result<Bytes, AppError>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let err = buffer_upload(futures_util::stream::iter(chunks), &limits)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TooLarge);

        let chunks: Vec<Result<Bytes, AppError>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let mut buf = buffer_upload(futures_util::stream::iter(chunks), &limits)
            .await
            .unwrap();
        assert_eq!(buf.read_all().unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_publish_twice_conflicts() {
        let repo = MemoryRepository::new();
        let limits = LimitsConfig::default();

        let parsed = publish_package(&repo, &limits, &owner(), None, buffer(nupkg("Foo", "1.0")))
            .await
            .unwrap();
        assert_eq!(parsed.version, "1.0.0");

        let err = publish_package(&repo, &limits, &owner(), None, buffer(nupkg("foo", "1.0.0")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_missing_manifest_writes_nothing() {
        let repo = MemoryRepository::new();
        let archive = build_zip(&[("readme.txt", &b"hi"[..])]);

        let err = publish_package(&repo, &LimitsConfig::default(), &owner(), None, buffer(archive))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MalformedInput);
        assert_eq!(repo.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_symbol_package_kinds_are_not_interchangeable() {
        let repo = MemoryRepository::new();
        let limits = LimitsConfig::default();

        let err = publish_package(
            &repo,
            &limits,
            &owner(),
            None,
            buffer(snupkg("Foo", "1.0.0", &[])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MalformedInput);

        let err = publish_symbol_package(&repo, &limits, &owner(), buffer(nupkg("Foo", "1.0.0")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::MalformedInput);
    }

    #[tokio::test]
    async fn test_symbols_require_existing_version() {
        let repo = MemoryRepository::new();
        let err = publish_symbol_package(
            &repo,
            &LimitsConfig::default(),
            &owner(),
            buffer(snupkg("Foo", "1.0.0", &[("Foo.pdb", portable_pdb(GUID))])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_symbol_loop_keeps_earlier_files() {
        let repo = MemoryRepository::new();
        let limits = LimitsConfig::default();
        publish_package(&repo, &limits, &owner(), None, buffer(nupkg("Foo", "1.0.0")))
            .await
            .unwrap();

        // same name and id twice: the second append is a duplicate file
        let pdb = portable_pdb(GUID);
        let archive = snupkg(
            "Foo",
            "1.0.0",
            &[("lib/a/Foo.pdb", pdb.clone()), ("lib/b/Foo.pdb", pdb)],
        );
        let err = publish_symbol_package(&repo, &limits, &owner(), buffer(archive))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Conflict);

        let mut properties = BTreeMap::new();
        properties.insert(PROPERTY_SYMBOL_ID.to_string(), GUID_ID.to_string());
        let found = repo
            .find_files_by_property(&FileSearchOptions {
                owner: owner(),
                package_type: PackageType::NuGet,
                filename: Some("foo.pdb".to_string()),
                properties,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].composite_key.as_deref(), Some(GUID_ID));
    }

    #[tokio::test]
    async fn test_symbol_package_without_pdbs() {
        let repo = MemoryRepository::new();
        let limits = LimitsConfig::default();
        publish_package(&repo, &limits, &owner(), None, buffer(nupkg("Foo", "1.0.0")))
            .await
            .unwrap();

        let upload = publish_symbol_package(
            &repo,
            &limits,
            &owner(),
            buffer(snupkg("Foo", "1.0.0", &[])),
        )
        .await
        .unwrap();
        assert!(upload.symbol_ids.is_empty());
        assert_eq!(upload.package.file_name(), "foo.1.0.0.snupkg");
    }
}
