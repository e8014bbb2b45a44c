//! NuGet V3 response documents
//!
//! Pure builders from [`PackageDescriptor`]s to the JSON shapes NuGet clients
//! consume. All absolute links come from a [`LinkBuilder`] handed in by the
//! caller; nothing here reads configuration or performs I/O.

use serde::Serialize;

use super::{Metadata, PackageDescriptor};

const SERVICE_INDEX_VERSION: &str = "3.0.0";
const REGISTRATION_INDEX_TYPES: [&str; 3] = [
    "catalog:CatalogRoot",
    "PackageRegistration",
    "catalog:Permalink",
];
const REGISTRATION_LEAF_TYPES: [&str; 2] = ["Package", "http://schema.nuget.org/catalog#Permalink"];

/// Builds absolute resource links below one owner's feed root.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    /// `base` is the feed root, e.g. `https://host/api/packages/acme/nuget`.
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        LinkBuilder {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn registration_index_url(&self, id: &str) -> String {
        format!("{}/registration/{}/index.json", self.base, id)
    }

    pub fn registration_leaf_url(&self, id: &str, version: &str) -> String {
        format!("{}/registration/{}/{}.json", self.base, id, version)
    }

    pub fn package_download_url(&self, id: &str, version: &str) -> String {
        format!(
            "{}/package/{}/{}/{}.{}.nupkg",
            self.base, id, version, id, version
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceIndexResponse {
    pub version: &'static str,
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Serialize)]
pub struct ServiceResource {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub resource_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationIndexResponse {
    #[serde(rename = "@id")]
    pub registration_index_url: String,
    #[serde(rename = "@type")]
    pub types: Vec<&'static str>,
    pub count: usize,
    pub items: Vec<RegistrationIndexPage>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationIndexPage {
    #[serde(rename = "@id")]
    pub registration_page_url: String,
    pub lower: String,
    pub upper: String,
    pub count: usize,
    pub items: Vec<RegistrationIndexPageItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationIndexPageItem {
    #[serde(rename = "@id")]
    pub registration_leaf_url: String,
    pub package_content: String,
    pub catalog_entry: CatalogEntry,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(rename = "@id")]
    pub catalog_leaf_url: String,
    pub package_content: String,
    pub id: String,
    pub version: String,
    pub description: String,
    pub release_notes: String,
    pub authors: String,
    pub require_license_acceptance: bool,
    pub project_url: String,
    pub dependency_groups: Vec<PackageDependencyGroup>,
    pub tags: String,
    pub title: String,
    pub summary: String,
    pub listed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDependencyGroup {
    pub target_framework: String,
    pub dependencies: Vec<PackageDependency>,
}

#[derive(Debug, Serialize)]
pub struct PackageDependency {
    pub id: String,
    pub range: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLeafResponse {
    #[serde(rename = "@id")]
    pub registration_leaf_url: String,
    #[serde(rename = "@type")]
    pub types: Vec<&'static str>,
    pub listed: bool,
    pub published: String,
    pub package_content: String,
    #[serde(rename = "registration")]
    pub registration_index_url: String,
    pub catalog_entry: CatalogEntry,
}

#[derive(Debug, Serialize)]
pub struct PackageVersionsResponse {
    pub versions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultResponse {
    pub total_hits: u64,
    pub data: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub version: String,
    pub versions: Vec<SearchResultVersion>,
    pub description: String,
    pub authors: String,
    pub project_url: String,
    #[serde(rename = "registration")]
    pub registration_index_url: String,
    pub title: String,
    pub summary: String,
    pub tags: String,
    pub icon_url: String,
    pub license_url: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResultVersion {
    #[serde(rename = "@id")]
    pub registration_leaf_url: String,
    pub version: String,
    pub downloads: u64,
}

/// Service discovery document.
pub fn service_index(links: &LinkBuilder) -> ServiceIndexResponse {
    let base = links.base();
    let resource = |path: &str, resource_type: &'static str| ServiceResource {
        id: format!("{base}{path}"),
        resource_type,
    };

    ServiceIndexResponse {
        version: SERVICE_INDEX_VERSION,
        resources: vec![
            resource("/query", "SearchQueryService"),
            resource("/query", "SearchQueryService/3.0.0-beta"),
            resource("/query", "SearchQueryService/3.0.0-rc"),
            resource("/registration", "RegistrationsBaseUrl"),
            resource("/registration", "RegistrationsBaseUrl/3.0.0-beta"),
            resource("/registration", "RegistrationsBaseUrl/3.0.0-rc"),
            resource("/package", "PackageBaseAddress/3.0.0"),
            resource("", "PackagePublish/2.0.0"),
            resource("/symbolpackage", "SymbolPackagePublish/4.9.0"),
        ],
    }
}

/// Paged registration index of one package.
///
/// Descriptors are ordered by version ascending and split into pages of at
/// most `page_size` inlined items. An empty slice yields an index without
/// pages.
pub fn registration_index(
    links: &LinkBuilder,
    name: &str,
    descriptors: &[PackageDescriptor],
    page_size: usize,
) -> RegistrationIndexResponse {
    let index_url = links.registration_index_url(name);

    let mut sorted: Vec<&PackageDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| a.semver.cmp(&b.semver));

    let items: Vec<RegistrationIndexPage> = sorted
        .chunks(page_size.max(1))
        .filter_map(|page| {
            let lower = page.first()?.semver.normalized();
            let upper = page.last()?.semver.normalized();
            Some(RegistrationIndexPage {
                registration_page_url: format!("{index_url}#page/{lower}/{upper}"),
                lower,
                upper,
                count: page.len(),
                items: page
                    .iter()
                    .map(|pd| RegistrationIndexPageItem {
                        registration_leaf_url: leaf_url(links, pd),
                        package_content: download_url(links, pd),
                        catalog_entry: catalog_entry(links, pd),
                    })
                    .collect(),
            })
        })
        .collect();

    RegistrationIndexResponse {
        registration_index_url: index_url,
        types: REGISTRATION_INDEX_TYPES.to_vec(),
        count: items.len(),
        items,
    }
}

/// Registration leaf of a single version.
pub fn registration_leaf(links: &LinkBuilder, pd: &PackageDescriptor) -> RegistrationLeafResponse {
    RegistrationLeafResponse {
        registration_leaf_url: leaf_url(links, pd),
        types: REGISTRATION_LEAF_TYPES.to_vec(),
        listed: true,
        published: pd.version.created_at.to_rfc3339(),
        package_content: download_url(links, pd),
        registration_index_url: links.registration_index_url(&pd.package.name),
        catalog_entry: catalog_entry(links, pd),
    }
}

/// Flat version list: lowercased normalised versions, ascending.
pub fn package_versions(descriptors: &[PackageDescriptor]) -> PackageVersionsResponse {
    let mut sorted: Vec<&PackageDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| a.semver.cmp(&b.semver));

    PackageVersionsResponse {
        versions: sorted
            .iter()
            .map(|pd| pd.semver.normalized().to_lowercase())
            .collect(),
    }
}

/// Search document with one entry per matching version, in the given order.
pub fn search_result(
    links: &LinkBuilder,
    total_hits: u64,
    descriptors: &[PackageDescriptor],
) -> SearchResultResponse {
    SearchResultResponse {
        total_hits,
        data: descriptors
            .iter()
            .map(|pd| {
                let m = &pd.metadata;
                SearchResult {
                    id: pd.package.name.clone(),
                    version: pd.semver.normalized(),
                    versions: vec![SearchResultVersion {
                        registration_leaf_url: leaf_url(links, pd),
                        version: pd.semver.normalized(),
                        downloads: 0,
                    }],
                    description: m.description.clone(),
                    authors: m.authors.clone(),
                    project_url: m.project_url.clone(),
                    registration_index_url: links.registration_index_url(&pd.package.name),
                    title: m.title.clone(),
                    summary: m.summary.clone(),
                    tags: m.tags.clone(),
                    icon_url: m.icon_url.clone(),
                    license_url: m.license_url.clone(),
                }
            })
            .collect(),
    }
}

fn leaf_url(links: &LinkBuilder, pd: &PackageDescriptor) -> String {
    links.registration_leaf_url(&pd.package.name, &pd.semver.normalized())
}

fn download_url(links: &LinkBuilder, pd: &PackageDescriptor) -> String {
    links.package_download_url(&pd.package.name, &pd.semver.normalized())
}

fn catalog_entry(links: &LinkBuilder, pd: &PackageDescriptor) -> CatalogEntry {
    let m = &pd.metadata;
    CatalogEntry {
        catalog_leaf_url: leaf_url(links, pd),
        package_content: download_url(links, pd),
        id: pd.package.name.clone(),
        version: pd.semver.normalized(),
        description: m.description.clone(),
        release_notes: m.release_notes.clone(),
        authors: m.authors.clone(),
        require_license_acceptance: m.require_license_acceptance,
        project_url: m.project_url.clone(),
        dependency_groups: dependency_groups(m),
        tags: m.tags.clone(),
        title: m.title.clone(),
        summary: m.summary.clone(),
        listed: true,
    }
}

fn dependency_groups(m: &Metadata) -> Vec<PackageDependencyGroup> {
    m.dependencies
        .iter()
        .map(|(framework, deps)| PackageDependencyGroup {
            target_framework: framework.clone(),
            dependencies: deps
                .iter()
                .map(|d| PackageDependency {
                    id: d.id.clone(),
                    range: d.version.clone(),
                })
                .collect(),
        })
        .collect()
}
