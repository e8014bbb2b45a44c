//! # Input Validation: Package Identifiers
//!
//! Syntax checks for NuGet package ids, version strings and owner names.
//! Version *semantics* (segments, pre-release ordering) live in
//! [`crate::version`]; this module only rejects input that must never reach
//! the parser or a storage path.

use regex::Regex;
use std::sync::OnceLock;

use crate::validation::error::ValidationError;
use crate::validation::limits::{MAX_OWNER_NAME_LENGTH, MAX_PACKAGE_ID_LENGTH, MAX_VERSION_LENGTH};
use crate::validation::result::ValidationResult;

fn package_id_regex() -> &'static Regex {
    static PACKAGE_ID_REGEX: OnceLock<Regex> = OnceLock::new();
    PACKAGE_ID_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]+(?:[.-][A-Za-z0-9_]+)*$").unwrap_or_else(|e| {
            panic!("Failed to compile NuGet package id regex: {}. This is a bug in the code - the regex pattern should be valid.", e)
        })
    })
}

fn check_common(input: &str, max: usize) -> ValidationResult<()> {
    if input.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if input.len() > max {
        return Err(ValidationError::TooLong {
            actual: input.len(),
            max,
        });
    }

    if input.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if input.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    Ok(())
}

/// Validate a NuGet package id.
///
/// Ids are runs of word characters separated by single `.` or `-`, e.g.
/// `Newtonsoft.Json` or `my-lib_2`.
pub fn validate_package_id(id: &str) -> ValidationResult<()> {
    check_common(id, MAX_PACKAGE_ID_LENGTH)?;

    if !package_id_regex().is_match(id) {
        return Err(ValidationError::InvalidFormat {
            reason: format!("'{}' is not a valid package id", id),
        });
    }

    Ok(())
}

/// Reject version strings that are empty, oversized or contain characters
/// outside the SemVer alphabet.
pub fn validate_version_syntax(version: &str) -> ValidationResult<()> {
    check_common(version, MAX_VERSION_LENGTH)?;

    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: version.to_string(),
        });
    }

    Ok(())
}

/// Validate the owner segment taken from the request path.
pub fn validate_owner_name(owner: &str) -> ValidationResult<()> {
    check_common(owner, MAX_OWNER_NAME_LENGTH)?;

    if owner.starts_with('.') || owner.starts_with('-') {
        return Err(ValidationError::InvalidFormat {
            reason: "owner names cannot start with . or -".to_string(),
        });
    }

    if !owner
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: owner.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_package_id() {
        assert!(validate_package_id("Newtonsoft.Json").is_ok());
        assert!(validate_package_id("my-lib_2").is_ok());
        assert!(validate_package_id("A").is_ok());

        assert!(validate_package_id("").is_err());
        assert!(validate_package_id(".leading").is_err());
        assert!(validate_package_id("trailing.").is_err());
        assert!(validate_package_id("double..dot").is_err());
        assert!(validate_package_id("with space").is_err());
        assert!(validate_package_id("../escape").is_err());
        assert!(validate_package_id("ünicode").is_err());
        assert!(validate_package_id(&"a".repeat(MAX_PACKAGE_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_version_syntax() {
        assert!(validate_version_syntax("1.0.0").is_ok());
        assert!(validate_version_syntax("1.0.0-beta.1+sha.abc").is_ok());

        assert!(validate_version_syntax("").is_err());
        assert!(validate_version_syntax("1.0/../0").is_err());
        assert!(validate_version_syntax("1.0\0").is_err());
    }

    #[test]
    fn test_validate_owner_name() {
        assert!(validate_owner_name("acme").is_ok());
        assert!(validate_owner_name("team_a.b-c").is_ok());

        assert!(validate_owner_name("").is_err());
        assert!(validate_owner_name("-acme").is_err());
        assert!(validate_owner_name("ac/me").is_err());
    }
}
