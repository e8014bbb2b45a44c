//! # Application State Management
//!
//! Shared state handed to every request handler.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nuget_registry::config::Config;
//! use nuget_registry::repository::MemoryRepository;
//! use nuget_registry::state::AppState;
//!
//! let state = AppState::new(Config::default(), Arc::new(MemoryRepository::new()));
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::nuget::response::LinkBuilder;
use crate::repository::PackageRepository;
use crate::types::Owner;

/// Application state containing shared configuration and the repository.
///
/// Wrapped in an `Arc` and shared across handlers; it holds no mutable state
/// of its own. All shared mutable state lives behind the repository.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Externally visible server address (e.g. "http://localhost:3080")
    pub server_addr: String,
    pub repository: Arc<dyn PackageRepository>,
}

impl AppState {
    pub fn new(config: Config, repository: Arc<dyn PackageRepository>) -> Self {
        AppState {
            server_addr: config.public_url(),
            config: Arc::new(config),
            repository,
        }
    }

    /// Link builder rooted at one owner's feed.
    pub fn links(&self, owner: &Owner) -> LinkBuilder {
        LinkBuilder::new(format!("{}/api/packages/{}/nuget", self.server_addr, owner))
    }
}
