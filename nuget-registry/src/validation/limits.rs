//! # Input Validation: Size Limits & Thresholds
//!
//! Constants bounding what the registry is willing to buffer or parse. The
//! `DEFAULT_*` values seed [`crate::config::LimitsConfig`] and can be raised
//! or lowered per deployment.

/// Default ceiling for a single uploaded package (32 MiB)
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 32 * 1024 * 1024;

/// Default ceiling for the `.nuspec` manifest inside an archive (3 MiB)
pub const DEFAULT_MAX_MANIFEST_SIZE: u64 = 3 * 1024 * 1024;

/// Default ceiling for all PDBs decompressed out of one symbol package (64 MiB)
pub const DEFAULT_MAX_SYMBOLS_TOTAL: u64 = 64 * 1024 * 1024;

/// Staging buffers larger than this spill to a temporary file (10 MB)
pub const MEMORY_THRESHOLD: usize = 10 * 1024 * 1024;

/// Maximum allowed NuGet package id length
pub const MAX_PACKAGE_ID_LENGTH: usize = 100;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 64;

/// Maximum allowed owner name length
pub const MAX_OWNER_NAME_LENGTH: usize = 64;

/// Maximum allowed filename length
pub const MAX_FILENAME_LENGTH: usize = 255;
