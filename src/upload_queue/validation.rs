//! File validation for queued uploads.

use thiserror::Error;

use super::models::{UploadError, UploadErrorCode, UploadFile};

/// Errors produced by local file validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {0} bytes (max: {1})")]
    FileTooLarge(u64, u64),
}

impl From<ValidationError> for UploadError {
    fn from(err: ValidationError) -> Self {
        let code = match err {
            ValidationError::UnsupportedType(_) => UploadErrorCode::UnsupportedType,
            ValidationError::FileTooLarge(_, _) => UploadErrorCode::FileTooLarge,
        };
        UploadError::new(code, err.to_string())
    }
}

/// Supported tabular file extensions.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "xls", "xlsx", "xlsm"];

/// MIME types that identify each supported extension.
///
/// The first entry is the canonical type sent with uploads.
pub fn mime_types_for(extension: &str) -> &'static [&'static str] {
    match extension {
        "csv" => &["text/csv", "application/csv"],
        "tsv" => &["text/tab-separated-values"],
        "txt" => &["text/plain"],
        "xls" => &["application/vnd.ms-excel"],
        "xlsx" => &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        "xlsm" => &["application/vnd.ms-excel.sheet.macroenabled.12"],
        _ => &[],
    }
}

/// Default size ceiling (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Rules applied by [`validate_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    /// Lowercase extensions without the leading dot.
    pub accepted_extensions: Vec<String>,
    /// Maximum file size in bytes (inclusive).
    pub max_file_size: u64,
}

impl ValidationRules {
    pub fn new(accepted_extensions: Vec<String>, max_file_size: u64) -> Self {
        Self {
            accepted_extensions: accepted_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            max_file_size,
        }
    }

    fn accepts_extension(&self, extension: &str) -> bool {
        self.accepted_extensions.iter().any(|a| a == extension)
    }

    /// A file name extension decides on its own. Without one, the declared
    /// MIME type must belong to an accepted extension.
    fn accepts_type(&self, file: &UploadFile) -> bool {
        if let Some(extension) = file.extension() {
            return self.accepts_extension(&extension);
        }

        let Some(content_type) = file.content_type.as_deref() else {
            return false;
        };
        // Ignore parameters such as "; charset=utf-8"
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        self.accepted_extensions
            .iter()
            .any(|ext| mime_types_for(ext).contains(&essence.as_str()))
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            accepted_extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Validate a file before it is queued or retried.
///
/// The type check runs first, so an oversized file with an unsupported type
/// reports `UnsupportedType`.
pub fn validate_file(file: &UploadFile, rules: &ValidationRules) -> Result<(), ValidationError> {
    if !rules.accepts_type(file) {
        let declared = file
            .content_type
            .clone()
            .or_else(|| file.extension())
            .unwrap_or_else(|| file.name.clone());
        return Err(ValidationError::UnsupportedType(declared));
    }

    let size = file.size();
    if size > rules.max_file_size {
        return Err(ValidationError::FileTooLarge(size, rules.max_file_size));
    }

    Ok(())
}
