//! Common test utilities and helpers
//!
//! Builds in-memory `.nupkg`/`.snupkg` archives and a registry backed by a
//! temporary data directory.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum_test::TestServer;
use nuget_registry::config::Config;
use nuget_registry::repository::LocalRepository;
use nuget_registry::{router, AppState};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const FEED: &str = "/api/packages/acme/nuget";

pub const PDB_GUID: [u8; 16] = [
    0x10, 0x32, 0x54, 0x76, 0x98, 0xba, 0xdc, 0xfe, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
];

/// Symbol server id of [`PDB_GUID`].
pub const PDB_ID: &str = "76543210ba98fedc0123456789abcdefffffffff";

/// Test registry setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub server: TestServer,
}

/// Start a registry on a file-backed repository inside `data_dir`.
pub async fn start_registry(data_dir: &Path) -> Result<TestServer> {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.server.public_url = Some("http://localhost:3080".to_string());

    let repository = LocalRepository::open(data_dir).await?;
    let state = AppState::new(config, Arc::new(repository));
    Ok(TestServer::new(router(state))?)
}

/// Creates a registry on a fresh temporary data directory.
pub async fn create_test_setup() -> Result<TestSetup> {
    let temp_dir = TempDir::new()?;
    let server = start_registry(temp_dir.path()).await?;
    Ok(TestSetup { temp_dir, server })
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

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
    <authors>Integration</authors>
    <description>Integration test package</description>
    <dependencies>
      <group targetFramework="net8.0">
        <dependency id="Newtonsoft.Json" version="[13.0.1, )" />
      </group>
    </dependencies>
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
        ("lib/net8.0/Lib.dll", &b"MZ"[..]),
    ])
}

pub fn snupkg(id: &str, version: &str, pdb_name: &str) -> Vec<u8> {
    let manifest = nuspec(id, version, true);
    let manifest_name = format!("{id}.nuspec");
    let pdb = portable_pdb(PDB_GUID);
    let pdb_path = format!("lib/net8.0/{pdb_name}");
    build_zip(&[
        (manifest_name.as_str(), manifest.as_bytes()),
        (pdb_path.as_str(), pdb.as_slice()),
    ])
}

/// Minimal portable PDB: metadata root with a single `#Pdb` stream.
pub fn portable_pdb(guid: [u8; 16]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"BSJB");
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    let version = b"PDB v1.0\0\0\0\0";
    out.extend_from_slice(&(version.len() as u32).to_le_bytes());
    out.extend_from_slice(version);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&48u32.to_le_bytes());
    out.extend_from_slice(&32u32.to_le_bytes());
    out.extend_from_slice(b"#Pdb\0\0\0\0");
    out.extend_from_slice(&guid);
    out.extend_from_slice(&[0x55; 16]);
    out
}

/// Count regular files below `dir`.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
