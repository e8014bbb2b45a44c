//! # NuGet Registry Server
//!
//! Core of a NuGet V3 package registry: publishing of `.nupkg` packages and
//! `.snupkg` symbol packages, the V3 service index, registration, package
//! content, search and a symbol server for portable PDBs.
//!
//! ## Key Modules
//!
//! - [`nuget`]: archive extractors, upload and retrieval orchestration,
//!   protocol documents and the HTTP handlers
//! - [`repository`]: the storage contract plus in-memory and file-backed
//!   implementations
//! - [`config`]: configuration management and limits
//! - [`state`]: application state shared by handlers
//! - [`error`]: error taxonomy and standardized responses
//! - [`validation`]: security-focused input validation utilities
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nuget_registry::{config::Config, repository::MemoryRepository, server, AppState};
//!
//! let state = AppState::new(Config::default(), Arc::new(MemoryRepository::new()));
//! let app = server::router(state);
//! # let _ = app;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod hash_utils;
pub mod nuget;
pub mod repository;
pub mod server;
pub mod state;
pub mod types;
pub mod validation;
pub mod version;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use server::{router, run_server};
pub use state::AppState;
pub use validation::{ValidationError, ValidationResult};
