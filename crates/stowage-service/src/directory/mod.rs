//! Directory operations and entry-name validation.

pub mod service;

pub use service::{CreateDirectoryRequest, DirectoryService};

use stowage_core::error::AppError;
use stowage_core::result::AppResult;

/// Longest accepted file or directory name, in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// Trim and check a file or directory name.
pub fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name must not be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(AppError::validation(format!(
            "Name exceeds {MAX_NAME_LENGTH} bytes"
        )));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(AppError::validation(format!("Invalid name: '{name}'")));
    }
    Ok(name.to_string())
}
