//! Relative-path validation for claimed files.
//!
//! Mirrors the validated-newtype pattern the teacher's `WorkspaceId::new`
//! uses: reject up front, return a typed error, never trust a caller's
//! string past this boundary.

use crate::error::CoreError;

/// Validate that `path` is usable as a claimed file path: relative, no
/// `..` traversal segment, not empty.
pub fn validate_relative_path(path: &str) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(CoreError::Validation("file path must not be empty".to_owned()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(CoreError::Validation(format!(
            "file path '{path}' must be relative, not absolute"
        )));
    }
    if looks_windows_absolute(path) {
        return Err(CoreError::Validation(format!(
            "file path '{path}' must be relative, not absolute"
        )));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(CoreError::Validation(format!(
            "file path '{path}' must not contain '..' segments"
        )));
    }
    if path.contains('\0') {
        return Err(CoreError::Validation(format!(
            "file path '{path}' must not contain a NUL byte"
        )));
    }
    Ok(())
}

fn looks_windows_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
