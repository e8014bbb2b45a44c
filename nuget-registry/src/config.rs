//! # Configuration Management
//!
//! Configuration for the NuGet registry server. Every section and field has
//! a default, so a configuration file only needs to list what it changes.
//!
//! - [`ServerConfig`]: bind address and the public URL used in links
//! - [`StorageConfig`]: data directory of the local repository
//! - [`LimitsConfig`]: upload, manifest and paging ceilings
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! # use nuget_registry::config::Config;
//! // Load from file with fallback to defaults
//! let config = Config::load_or_default("config.json")?;
//!
//! // Load from file (fails if file doesn't exist)
//! let config = Config::load("config.json")?;
//!
//! // Use built-in defaults
//! let config = Config::default();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{AppError, AppResult};
use crate::validation::{
    DEFAULT_MAX_MANIFEST_SIZE, DEFAULT_MAX_SYMBOLS_TOTAL, DEFAULT_MAX_UPLOAD_SIZE, MEMORY_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure for the registry server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

/// Network settings of the HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host/IP address to bind to
    pub host: String,
    pub port: u16,
    /// URL scheme ("http" or "https") used when no public URL is set
    pub scheme: String,
    /// Externally visible base URL, e.g. behind a reverse proxy
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3080,
            scheme: "http".to_string(),
            public_url: None,
        }
    }
}

/// Storage location of the local repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Upload and paging limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted package or symbol package, in bytes
    pub max_upload_size: u64,
    /// Staging buffers above this size spill to a temporary file
    pub memory_threshold: usize,
    /// Largest accepted `.nuspec`, in bytes
    pub max_manifest_size: u64,
    /// Largest accepted single PDB inside a symbol package, in bytes
    pub max_symbol_size: u64,
    /// Largest decompressed size of all PDBs in one symbol package, in bytes
    pub max_symbols_total: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Inlined items per registration index page
    pub registration_page_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            memory_threshold: MEMORY_THRESHOLD,
            max_manifest_size: DEFAULT_MAX_MANIFEST_SIZE,
            max_symbol_size: DEFAULT_MAX_UPLOAD_SIZE,
            max_symbols_total: DEFAULT_MAX_SYMBOLS_TOTAL,
            default_page_size: 20,
            max_page_size: 100,
            registration_page_size: 64,
        }
    }
}

impl LimitsConfig {
    /// Resolve the requested page size against the configured defaults.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.default_page_size,
            Some(take) => take.min(self.max_page_size),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid configuration JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with fallback to defaults.
    ///
    /// A missing file yields [`Config::default`]; a file that exists but
    /// cannot be parsed is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(public_url) = &self.server.public_url {
            let url = url::Url::parse(public_url).map_err(|e| {
                AppError::BadRequest(format!("invalid public_url '{public_url}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::BadRequest(format!(
                    "public_url must be http or https, got '{}'",
                    url.scheme()
                )));
            }
        }

        let limits = &self.limits;
        if limits.registration_page_size == 0 || limits.default_page_size == 0 {
            return Err(AppError::BadRequest(
                "page sizes must be greater than zero".to_string(),
            ));
        }
        if limits.max_page_size < limits.default_page_size {
            return Err(AppError::BadRequest(format!(
                "max_page_size ({}) is smaller than default_page_size ({})",
                limits.max_page_size, limits.default_page_size
            )));
        }
        Ok(())
    }

    /// Externally visible server URL without a trailing slash.
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "{}://{}:{}",
                self.server.scheme, self.server.host, self.server.port
            ),
        }
    }
}
