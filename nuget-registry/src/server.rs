//! HTTP server setup for the NuGet registry
//!
//! Builds the axum router for the NuGet V3 routes and runs it on top of the
//! file-backed [`LocalRepository`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::nuget::handlers;
use crate::repository::LocalRepository;
use crate::state::AppState;

/// Slack on top of the upload ceiling for multipart framing; the staging
/// buffer enforces the exact limit.
const BODY_LIMIT_SLACK: u64 = 1024 * 1024;

/// Mount point of every owner's feed.
pub const FEED_PREFIX: &str = "/api/packages/{owner}/nuget";

fn feed(path: &str) -> String {
    format!("{FEED_PREFIX}{path}")
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .limits
        .max_upload_size
        .saturating_add(BODY_LIMIT_SLACK);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route(&feed("/index.json"), get(handlers::service_index))
        .route(&feed("/query"), get(handlers::search))
        .route(
            &feed("/registration/{id}/{leaf}"),
            get(handlers::registration),
        )
        .route(
            &feed("/package/{id}/{version}"),
            get(handlers::package_versions).delete(handlers::delete_package),
        )
        .route(
            &feed("/package/{id}/{version}/{filename}"),
            get(handlers::download_package_file),
        )
        // NuGet clients push to the feed root with and without a trailing slash
        .route(FEED_PREFIX, put(handlers::upload_package))
        .route(&feed("/"), put(handlers::upload_package))
        .route(&feed("/symbolpackage"), put(handlers::upload_symbol_package))
        .route(
            &feed("/symbols/{filename}/{guid}/{filename2}"),
            get(handlers::download_symbol_file),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Open the local repository and serve until interrupted.
pub async fn run_server(config: Config) -> Result<()> {
    info!("Starting NuGet registry");

    let host = config.server.host.clone();
    let port = config.server.port;
    let data_dir = config.storage.data_dir.clone();

    let repository = LocalRepository::open(&data_dir)
        .await
        .with_context(|| format!("Failed to open repository in {}", data_dir.display()))?;
    info!(data_dir = %data_dir.display(), "Using data directory");

    let state = AppState::new(config, Arc::new(repository));
    let public_url = state.server_addr.clone();
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {}:{}: {}", host, port, e)
    })?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e)
    })?;

    let feed = format!("{public_url}{FEED_PREFIX}/index.json");
    info!(addr = %addr, feed = %feed, "Server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal, stopping server");
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    Ok(())
}
