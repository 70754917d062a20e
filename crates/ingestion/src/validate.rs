//! Upload validation
//!
//! Nothing reaches the chunker or the index unless it passes here. The
//! file name becomes the document id and a file name on disk, so it is
//! checked as strictly as the content.

use docvault_common::config::IngestionConfig;
use docvault_common::errors::{AppError, Result};

/// Longest accepted file name in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// An upload that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// Document id, equal to the accepted file name
    pub document_id: String,
    /// Decoded text content
    pub text: String,
    /// Size of the raw upload in bytes
    pub size_bytes: usize,
}

/// Check file name, size and format of an upload
pub fn validate_upload(
    filename: &str,
    bytes: &[u8],
    config: &IngestionConfig,
) -> Result<ValidatedUpload> {
    let document_id = validate_filename(filename)?;
    validate_extension(&document_id, &config.allowed_extensions)?;

    if bytes.is_empty() {
        return Err(AppError::Validation {
            message: "file is empty".to_string(),
            field: Some("file".to_string()),
        });
    }
    if bytes.len() > config.max_file_bytes {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: config.max_file_bytes,
        });
    }

    let text = std::str::from_utf8(bytes).map_err(|e| AppError::UnsupportedFormat {
        message: format!("{} is not valid UTF-8 text (byte {})", document_id, e.valid_up_to()),
    })?;
    if text.contains('\0') {
        return Err(AppError::UnsupportedFormat {
            message: format!("{} contains NUL bytes", document_id),
        });
    }
    if text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "file contains no text".to_string(),
            field: Some("file".to_string()),
        });
    }

    Ok(ValidatedUpload {
        document_id,
        text: text.to_string(),
        size_bytes: bytes.len(),
    })
}

fn validate_filename(filename: &str) -> Result<String> {
    let name = filename.trim();
    let invalid = |reason: &str| AppError::Validation {
        message: format!("invalid file name {:?}: {}", filename, reason),
        field: Some("filename".to_string()),
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(invalid("too long"));
    }
    if name.contains(|c: char| c == '/' || c == '\\') {
        return Err(invalid("path separators are not allowed"));
    }
    if name.contains("..") {
        return Err(invalid("'..' is not allowed"));
    }
    if name.starts_with('.') {
        return Err(invalid("hidden files are not allowed"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("control characters are not allowed"));
    }
    Ok(name.to_string())
}

fn validate_extension(name: &str, allowed: &[String]) -> Result<()> {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(())
    } else {
        Err(AppError::UnsupportedFormat {
            message: format!(
                "{} is not an accepted format (accepted: {})",
                name,
                allowed.join(", ")
            ),
        })
    }
}
