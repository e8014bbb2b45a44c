//! # Input Validation: Path and Filename Validation
//!
//! Client-supplied file names end up in index lookups and response headers,
//! so they must never carry separators or traversal sequences.

use crate::validation::error::ValidationError;
use crate::validation::limits::MAX_FILENAME_LENGTH;
use crate::validation::result::ValidationResult;

/// Validate a single file name as sent by clients or found inside archives.
///
/// Rejects empty names, separators, parent references, null bytes, control
/// characters and names longer than [`MAX_FILENAME_LENGTH`].
pub fn validate_filename(filename: &str) -> ValidationResult<()> {
    if filename.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::TooLong {
            actual: filename.len(),
            max: MAX_FILENAME_LENGTH,
        });
    }

    if filename.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if filename.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::InvalidCharacters {
            input: filename.to_string(),
        });
    }

    if filename == "." || filename.contains("..") {
        return Err(ValidationError::PathTraversal {
            path: filename.to_string(),
        });
    }

    Ok(())
}
