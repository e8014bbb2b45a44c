//! HTTP handlers for the NuGet V3 feed
//!
//! Thin axum boundary: extracts path, query and body, calls the
//! orchestrators and maps their results onto status codes. All routes live
//! below `/api/packages/{owner}/nuget`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path as AxumPath, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::response::{self, PackageVersionsResponse, SearchResultResponse, ServiceIndexResponse};
use super::retrieval::{self, Download, SearchQuery};
use super::upload;
use crate::buffer::HashedBuffer;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::types::Owner;
use crate::validation::validate_filename;

/// Service discovery document.
///
/// # Route
/// `GET /api/packages/{owner}/nuget/index.json`
pub async fn service_index(
    AxumPath(owner): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ServiceIndexResponse>> {
    let owner: Owner = owner.parse()?;
    Ok(Json(response::service_index(&state.links(&owner))))
}

/// Search query string. `skip` and `take` are kept raw so that values which
/// are not non-negative integers fall back to their defaults.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    skip: Option<String>,
    take: Option<String>,
}

fn lenient_int(value: Option<&str>) -> Option<usize> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Search packages by name.
///
/// # Route
/// `GET /api/packages/{owner}/nuget/query?q=&skip=&take=`
pub async fn search(
    AxumPath(owner): AxumPath<String>,
    Query(params): Query<SearchParams>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<SearchResultResponse>> {
    let owner: Owner = owner.parse()?;
    let query = SearchQuery {
        query: params.q.unwrap_or_default(),
        skip: lenient_int(params.skip.as_deref()).unwrap_or(0),
        take: state
            .config
            .limits
            .page_size(lenient_int(params.take.as_deref())),
    };

    let result = retrieval::search(
        state.repository.as_ref(),
        &state.links(&owner),
        &owner,
        &query,
    )
    .await?;
    Ok(Json(result))
}

/// Registration index (`index.json`) or leaf (`{version}.json`).
///
/// # Route
/// `GET /api/packages/{owner}/nuget/registration/{id}/{leaf}`
pub async fn registration(
    AxumPath((owner, id, leaf)): AxumPath<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let owner: Owner = owner.parse()?;
    let links = state.links(&owner);
    let repository = state.repository.as_ref();

    if leaf == "index.json" {
        let index = retrieval::registration_index(
            repository,
            &links,
            &owner,
            &id,
            state.config.limits.registration_page_size,
        )
        .await?;
        return Ok(Json(index).into_response());
    }

    let version = leaf
        .strip_suffix(".json")
        .ok_or_else(|| AppError::NotFound(format!("registration resource {leaf} not found")))?;
    let leaf = retrieval::registration_leaf(repository, &links, &owner, &id, version).await?;
    Ok(Json(leaf).into_response())
}

/// Version list of a package.
///
/// # Route
/// `GET /api/packages/{owner}/nuget/package/{id}/index.json`
pub async fn package_versions(
    AxumPath((owner, id, version)): AxumPath<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<PackageVersionsResponse>> {
    if version != "index.json" {
        return Err(AppError::NotFound(format!(
            "package resource {id}/{version} not found"
        )));
    }
    let owner: Owner = owner.parse()?;
    let versions = retrieval::list_versions(state.repository.as_ref(), &owner, &id).await?;
    Ok(Json(versions))
}

/// Package content download.
///
/// # Route
/// `GET /api/packages/{owner}/nuget/package/{id}/{version}/{filename}`
pub async fn download_package_file(
    AxumPath((owner, id, version, filename)): AxumPath<(String, String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let owner: Owner = owner.parse()?;
    validate_filename(&filename)?;

    let download = retrieval::download_package_file(
        state.repository.as_ref(),
        &owner,
        &id,
        &version,
        &filename,
    )
    .await?;
    stream_download(download)
}

/// Symbol server download.
///
/// # Route
/// `GET /api/packages/{owner}/nuget/symbols/{filename}/{guid}/{filename2}`
pub async fn download_symbol_file(
    AxumPath((owner, filename, guid, filename2)): AxumPath<(String, String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let owner: Owner = owner.parse()?;
    let download = retrieval::download_symbol_file(
        state.repository.as_ref(),
        &owner,
        &filename,
        &guid,
        &filename2,
    )
    .await?;
    stream_download(download)
}

/// Publish a package.
///
/// Accepts `multipart/form-data` (the first file part, as NuGet clients
/// send it) or a raw archive body.
///
/// # Route
/// `PUT /api/packages/{owner}/nuget/`
pub async fn upload_package(
    AxumPath(owner): AxumPath<String>,
    State(state): State<Arc<AppState>>,
    request: Request,
) -> AppResult<StatusCode> {
    let owner: Owner = owner.parse()?;
    let data = read_upload(&state, request).await?;

    let parsed = upload::publish_package(
        state.repository.as_ref(),
        &state.config.limits,
        &owner,
        None,
        data,
    )
    .await?;

    info!(
        owner = %owner,
        package = %parsed.id,
        version = %parsed.version,
        "Package upload accepted"
    );
    Ok(StatusCode::CREATED)
}

/// Publish a symbol package.
///
/// # Route
/// `PUT /api/packages/{owner}/nuget/symbolpackage`
pub async fn upload_symbol_package(
    AxumPath(owner): AxumPath<String>,
    State(state): State<Arc<AppState>>,
    request: Request,
) -> AppResult<StatusCode> {
    let owner: Owner = owner.parse()?;
    let data = read_upload(&state, request).await?;

    let upload = upload::publish_symbol_package(
        state.repository.as_ref(),
        &state.config.limits,
        &owner,
        data,
    )
    .await?;

    info!(
        owner = %owner,
        package = %upload.package.id,
        version = %upload.package.version,
        symbols = upload.symbol_ids.len(),
        "Symbol package upload accepted"
    );
    Ok(StatusCode::CREATED)
}

/// Delete one version.
///
/// # Route
/// `DELETE /api/packages/{owner}/nuget/package/{id}/{version}`
pub async fn delete_package(
    AxumPath((owner, id, version)): AxumPath<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<StatusCode> {
    let owner: Owner = owner.parse()?;
    retrieval::delete_package(state.repository.as_ref(), &owner, &id, &version).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
}

async fn read_upload(state: &Arc<AppState>, request: Request) -> AppResult<HashedBuffer> {
    let limits = &state.config.limits;

    if !is_multipart(request.headers()) {
        debug!("Reading raw upload body");
        return upload::buffer_upload(request.into_body().into_data_stream(), limits).await;
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_none() && field.content_type().is_none() {
            debug!(field = ?field.name(), "Skipping non-file multipart field");
            continue;
        }
        debug!(field = ?field.name(), file = ?field.file_name(), "Reading multipart upload");
        return upload::buffer_upload(field, limits).await;
    }

    Err(AppError::BadRequest(
        "multipart upload does not contain a package file".to_string(),
    ))
}

fn stream_download(download: Download) -> AppResult<Response> {
    let Download { file, stream } = download;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.name))
        .map_err(|e| AppError::InternalError(format!("invalid file name header: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size));
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    let body = Body::from_stream(ReaderStream::new(stream));
    Ok((StatusCode::OK, headers, body).into_response())
}
