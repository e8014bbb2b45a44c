//! # Input Validation Utilities
//!
//! Security-focused validation helpers applied to everything a client can
//! send: package identifiers, version strings, owner names and file
//! names. Uploaded archives are hostile input, so every check here is cheap,
//! bounded and panic-free.

pub mod error;
pub mod identifiers;
pub mod limits;
pub mod paths;
pub mod result;

pub use self::{
    error::ValidationError,
    identifiers::{validate_owner_name, validate_package_id, validate_version_syntax},
    limits::{
        DEFAULT_MAX_MANIFEST_SIZE, DEFAULT_MAX_SYMBOLS_TOTAL, DEFAULT_MAX_UPLOAD_SIZE,
        MAX_FILENAME_LENGTH, MAX_OWNER_NAME_LENGTH, MAX_PACKAGE_ID_LENGTH, MAX_VERSION_LENGTH,
        MEMORY_THRESHOLD,
    },
    paths::validate_filename,
    result::ValidationResult,
};
