//! Metadata index shared by the repository implementations
//!
//! Holds packages, versions and files and enforces the uniqueness rules of
//! the data model. It performs no I/O; the owning repository serialises
//! access to it and decides how (and whether) it is persisted.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    FileSearchOptions, Package, PackageCreation, PackageFile, PackageFileInfo, PackageInfo,
    PackageVersion, RepositoryError, RepositoryResult, SearchOptions, StagedFile,
};
use crate::types::{Owner, PackageType};
use crate::version::{version_lookup_key, NuGetVersion};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryIndex {
    next_id: u64,
    packages: BTreeMap<u64, Package>,
    versions: BTreeMap<u64, PackageVersion>,
    files: BTreeMap<u64, PackageFile>,
}

impl RepositoryIndex {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn package(&self, package_id: u64) -> RepositoryResult<&Package> {
        self.packages
            .get(&package_id)
            .ok_or(RepositoryError::PackageNotFound)
    }

    pub fn find_package(
        &self,
        owner: &Owner,
        package_type: PackageType,
        name: &str,
    ) -> Option<&Package> {
        let lower_name = name.to_lowercase();
        self.packages.values().find(|p| {
            p.owner == *owner && p.package_type == package_type && p.lower_name == lower_name
        })
    }

    fn find_version_in(&self, package_id: u64, version: &str) -> Option<&PackageVersion> {
        let key = version_lookup_key(version);
        self.versions
            .values()
            .find(|v| v.package_id == package_id && v.lower_version == key)
    }

    pub fn find_version(&self, info: &PackageInfo) -> RepositoryResult<&PackageVersion> {
        let package = self
            .find_package(&info.owner, info.package_type, &info.name)
            .ok_or(RepositoryError::PackageNotFound)?;
        self.find_version_in(package.id, &info.version)
            .ok_or(RepositoryError::VersionNotFound)
    }

    pub fn versions_of(&self, package_id: u64) -> Vec<PackageVersion> {
        self.versions
            .values()
            .filter(|v| v.package_id == package_id)
            .cloned()
            .collect()
    }

    fn find_file_in(&self, version_id: u64, file: &PackageFileInfo) -> Option<&PackageFile> {
        let lower_name = file.filename.to_lowercase();
        let key = file.composite_key.as_ref().map(|k| k.to_lowercase());
        self.files.values().find(|f| {
            f.version_id == version_id && f.name == lower_name && f.composite_key == key
        })
    }

    pub fn find_file(
        &self,
        version_id: u64,
        file: &PackageFileInfo,
    ) -> RepositoryResult<PackageFile> {
        self.find_file_in(version_id, file)
            .cloned()
            .ok_or(RepositoryError::FileNotFound)
    }

    pub fn files_of(&self, version_id: u64) -> Vec<PackageFile> {
        self.files
            .values()
            .filter(|f| f.version_id == version_id)
            .cloned()
            .collect()
    }

    /// Fails with `DuplicateVersion` if the version already exists.
    pub fn check_create(&self, creation: &PackageCreation) -> RepositoryResult<()> {
        match self.find_version(&creation.info) {
            Ok(_) => Err(RepositoryError::DuplicateVersion),
            Err(_) => Ok(()),
        }
    }

    /// Resolves the target version of an append, rejecting duplicates.
    pub fn check_add(&self, info: &PackageInfo, file: &PackageFileInfo) -> RepositoryResult<u64> {
        let version = match self.find_version(info) {
            Ok(version) => version,
            Err(_) => return Err(RepositoryError::VersionNotFound),
        };
        if self.find_file_in(version.id, file).is_some() {
            return Err(RepositoryError::DuplicateFile);
        }
        Ok(version.id)
    }

    fn insert_file(
        &mut self,
        version_id: u64,
        staged: StagedFile,
        now: DateTime<Utc>,
    ) -> PackageFile {
        let id = self.allocate_id();
        let file = PackageFile {
            id,
            version_id,
            name: staged.info.filename.to_lowercase(),
            size: staged.size,
            hashes: staged.hashes,
            is_lead: staged.is_lead,
            composite_key: staged.info.composite_key.map(|k| k.to_lowercase()),
            properties: staged.properties,
            created_at: now,
        };
        self.files.insert(id, file.clone());
        file
    }

    pub fn create_version_with_file(
        &mut self,
        creation: &PackageCreation,
        staged: StagedFile,
        now: DateTime<Utc>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)> {
        self.check_create(creation)?;
        let info = &creation.info;

        let package_id = match self.find_package(&info.owner, info.package_type, &info.name) {
            Some(package) => package.id,
            None => {
                let id = self.allocate_id();
                self.packages.insert(
                    id,
                    Package {
                        id,
                        owner: info.owner.clone(),
                        package_type: info.package_type,
                        name: info.name.clone(),
                        lower_name: info.name.to_lowercase(),
                        created_at: now,
                    },
                );
                id
            }
        };

        let version_id = self.allocate_id();
        let version = PackageVersion {
            id: version_id,
            package_id,
            version: info.version.clone(),
            lower_version: version_lookup_key(&info.version),
            metadata: creation.metadata.clone(),
            creator: creation.creator.clone(),
            created_at: now,
        };
        self.versions.insert(version_id, version.clone());

        let file = self.insert_file(version_id, staged, now);
        Ok((version, file))
    }

    pub fn add_file(
        &mut self,
        info: &PackageInfo,
        staged: StagedFile,
        now: DateTime<Utc>,
    ) -> RepositoryResult<(PackageVersion, PackageFile)> {
        let version_id = self.check_add(info, &staged.info)?;
        let version = self
            .versions
            .get(&version_id)
            .cloned()
            .ok_or(RepositoryError::VersionNotFound)?;
        let file = self.insert_file(version_id, staged, now);
        Ok((version, file))
    }

    /// Removes a version and its files, and the package once it has no
    /// versions left. Returns the removed files.
    pub fn remove_version(&mut self, info: &PackageInfo) -> RepositoryResult<Vec<PackageFile>> {
        let version = self
            .find_version(info)
            .map_err(|_| RepositoryError::VersionNotFound)?
            .clone();

        let file_ids: Vec<u64> = self
            .files
            .values()
            .filter(|f| f.version_id == version.id)
            .map(|f| f.id)
            .collect();
        let removed = file_ids
            .into_iter()
            .filter_map(|id| self.files.remove(&id))
            .collect();

        self.versions.remove(&version.id);
        if !self.versions.values().any(|v| v.package_id == version.package_id) {
            self.packages.remove(&version.package_id);
        }

        Ok(removed)
    }

    /// Whether any file still references the blob with this digest.
    pub fn blob_in_use(&self, sha256: &str) -> bool {
        self.files.values().any(|f| f.hashes.sha256 == sha256)
    }

    pub fn search_versions(&self, options: &SearchOptions) -> (Vec<PackageVersion>, u64) {
        let query = options.query.trim().to_lowercase();

        let packages: HashMap<u64, &Package> = self
            .packages
            .values()
            .filter(|p| {
                p.owner == options.owner
                    && p.package_type == options.package_type
                    && p.lower_name.contains(&query)
            })
            .map(|p| (p.id, p))
            .collect();

        let mut matches: Vec<(&Package, &PackageVersion, Option<NuGetVersion>)> = self
            .versions
            .values()
            .filter_map(|v| {
                packages
                    .get(&v.package_id)
                    .map(|p| (*p, v, NuGetVersion::parse(&v.version).ok()))
            })
            .collect();

        matches.sort_by(|a, b| {
            a.0.lower_name.cmp(&b.0.lower_name).then_with(|| match (&a.2, &b.2) {
                (Some(x), Some(y)) => y.cmp(x),
                _ => b.1.lower_version.cmp(&a.1.lower_version),
            })
        });

        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(options.skip)
            .take(options.take)
            .map(|(_, v, _)| v.clone())
            .collect();

        (page, total)
    }

    pub fn find_files_by_property(&self, options: &FileSearchOptions) -> Vec<PackageFile> {
        let filename = options.filename.as_ref().map(|f| f.to_lowercase());

        self.files
            .values()
            .filter(|f| {
                let owned = self
                    .versions
                    .get(&f.version_id)
                    .and_then(|v| self.packages.get(&v.package_id))
                    .is_some_and(|p| {
                        p.owner == options.owner && p.package_type == options.package_type
                    });
                owned
                    && filename.as_ref().map_or(true, |name| &f.name == name)
                    && options
                        .properties
                        .iter()
                        .all(|(k, v)| f.properties.get(k) == Some(v))
            })
            .cloned()
            .collect()
    }
}
