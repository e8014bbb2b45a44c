//! Archive metadata extraction
//!
//! A `.nupkg` is a zip archive with a single `*.nuspec` manifest at its root.
//! Only the manifest entry is decompressed, and never more than the
//! configured ceiling, so a hostile archive cannot make the parser allocate
//! without bound. The reader is left wherever parsing stopped; callers rewind
//! before re-reading.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

use super::{Dependency, ExtractError, ExtractResult, Metadata, ParsedPackage};
use crate::types::PackageKind;
use crate::validation::validate_package_id;
use crate::version::NuGetVersion;

const SYMBOLS_PACKAGE_TYPE: &str = "SymbolsPackage";

#[derive(Debug, Deserialize)]
struct Nuspec {
    metadata: NuspecMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NuspecMetadata {
    id: String,
    version: String,
    title: String,
    authors: String,
    owners: String,
    description: String,
    summary: String,
    release_notes: String,
    project_url: String,
    icon_url: String,
    license_url: String,
    tags: String,
    require_license_acceptance: String,
    repository: Option<NuspecRepository>,
    package_types: Option<NuspecPackageTypes>,
    dependencies: Option<NuspecDependencies>,
}

#[derive(Debug, Default, Deserialize)]
struct NuspecRepository {
    #[serde(rename = "@url", default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct NuspecPackageTypes {
    #[serde(rename = "packageType", default)]
    items: Vec<NuspecPackageType>,
}

#[derive(Debug, Deserialize)]
struct NuspecPackageType {
    #[serde(rename = "@name", default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct NuspecDependencies {
    #[serde(default)]
    group: Vec<NuspecDependencyGroup>,
    #[serde(default)]
    dependency: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
struct NuspecDependencyGroup {
    #[serde(rename = "@targetFramework", default)]
    target_framework: String,
    #[serde(default)]
    dependency: Vec<NuspecDependency>,
}

#[derive(Debug, Deserialize)]
struct NuspecDependency {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@version", default)]
    version: String,
}

/// Parse the manifest and check it declares the `expected` kind.
pub fn parse_package_metadata<R: Read + Seek>(
    reader: R,
    expected: PackageKind,
    max_manifest_size: u64,
) -> ExtractResult<ParsedPackage> {
    let parsed = parse_manifest(reader, max_manifest_size)?;
    if parsed.kind != expected {
        return Err(ExtractError::UnexpectedPackageType {
            expected,
            actual: parsed.kind,
        });
    }
    Ok(parsed)
}

/// Parse the manifest of an archive of either kind.
pub fn parse_manifest<R: Read + Seek>(
    reader: R,
    max_manifest_size: u64,
) -> ExtractResult<ParsedPackage> {
    let mut archive = ZipArchive::new(reader)?;

    let name = archive
        .file_names()
        .find(|name| is_root_manifest(name))
        .map(str::to_string)
        .ok_or(ExtractError::MissingManifest)?;

    let entry = archive.by_name(&name)?;
    if entry.size() > max_manifest_size {
        return Err(ExtractError::ManifestTooLarge {
            size: entry.size(),
            max: max_manifest_size,
        });
    }

    let mut raw = Vec::with_capacity(entry.size() as usize);
    entry.take(max_manifest_size + 1).read_to_end(&mut raw)?;
    if raw.len() as u64 > max_manifest_size {
        return Err(ExtractError::ManifestTooLarge {
            size: raw.len() as u64,
            max: max_manifest_size,
        });
    }

    parse_nuspec(&raw)
}

fn is_root_manifest(name: &str) -> bool {
    !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec")
}

/// Parse and validate raw `.nuspec` XML.
pub fn parse_nuspec(raw: &[u8]) -> ExtractResult<ParsedPackage> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ExtractError::InvalidManifest(format!("not UTF-8: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let nuspec: Nuspec =
        quick_xml::de::from_str(text).map_err(|e| ExtractError::InvalidManifest(e.to_string()))?;
    let m = nuspec.metadata;

    let id = m.id.trim().to_string();
    validate_package_id(&id).map_err(|e| ExtractError::InvalidIdentifier(format!("'{id}': {e}")))?;

    let version = NuGetVersion::parse(&m.version)
        .map_err(|e| ExtractError::InvalidVersion(e.to_string()))?
        .normalized();

    let kind = match &m.package_types {
        Some(types) if types.items.iter().any(|t| t.name == SYMBOLS_PACKAGE_TYPE) => {
            PackageKind::Symbols
        }
        _ => PackageKind::Dependency,
    };

    let metadata = Metadata {
        title: m.title,
        authors: m.authors,
        owners: m.owners,
        description: m.description,
        summary: m.summary,
        release_notes: m.release_notes,
        project_url: m.project_url,
        repository_url: m.repository.map(|r| r.url).unwrap_or_default(),
        icon_url: m.icon_url,
        license_url: m.license_url,
        tags: m.tags,
        require_license_acceptance: m
            .require_license_acceptance
            .trim()
            .eq_ignore_ascii_case("true"),
        dependencies: m.dependencies.map(collect_dependencies).unwrap_or_default(),
    };

    debug!(id = %id, version = %version, kind = %kind, "Parsed .nuspec");
    Ok(ParsedPackage {
        id,
        version,
        kind,
        metadata,
    })
}

fn collect_dependencies(deps: NuspecDependencies) -> BTreeMap<String, Vec<Dependency>> {
    let mut groups: BTreeMap<String, Vec<Dependency>> = BTreeMap::new();

    let ungrouped = deps.dependency.into_iter().map(|d| (String::new(), d));
    let grouped = deps.group.into_iter().flat_map(|g| {
        let framework = g.target_framework;
        g.dependency.into_iter().map(move |d| (framework.clone(), d))
    });

    for (framework, dep) in ungrouped.chain(grouped) {
        if dep.id.trim().is_empty() {
            continue;
        }
        groups.entry(framework).or_default().push(Dependency {
            id: dep.id.trim().to_string(),
            version: dep.version.trim().to_string(),
        });
    }
    groups
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Build a zip archive from `(name, content)` pairs.
    pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// A minimal manifest; `symbols` adds the `SymbolsPackage` type.
    pub fn nuspec(id: &str, version: &str, symbols: bool) -> String {
        let package_types = if symbols {
            r#"<packageTypes><packageType name="SymbolsPackage" /></packageTypes>"#
        } else {
            ""
        };
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Jane Doe</authors>
    <description>Test package</description>
    {package_types}
  </metadata>
</package>"#
        )
    }

    pub fn nupkg(id: &str, version: &str) -> Vec<u8> {
        let manifest = nuspec(id, version, false);
        let manifest_name = format!("{id}.nuspec");
        build_zip(&[
            (manifest_name.as_str(), manifest.as_bytes()),
            ("lib/net6.0/Lib.dll", &b"MZ"[..]),
        ])
    }
}
