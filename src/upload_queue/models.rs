//! Data models for the upload queue.
//!
//! Defines queue items, statuses, item-level errors, parsed results and
//! batch-level summaries.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of an upload queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Ready,
    Processing,
    Completed, // terminal, never re-enters Ready
    Error,     // terminal until retried
    Cancelled, // terminal until retried
}

impl QueueStatus {
    /// Returns true if no further automatic transition happens from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Error | QueueStatus::Cancelled
        )
    }

    /// Returns true if `retry_failed` picks this state up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueStatus::Error | QueueStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Ready => "READY",
            QueueStatus::Processing => "PROCESSING",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::Error => "ERROR",
            QueueStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Code identifying why an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadErrorCode {
    UnsupportedType,  // local validation, re-checked on retry
    FileTooLarge,     // local validation, re-checked on retry
    AuthError,        // no credential at attempt time
    ProcessingFailed, // server rejection or transport failure
    Cancelled,        // abandoned by cancel_processing
}

impl UploadErrorCode {
    /// Returns true if this code was produced by local validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadErrorCode::UnsupportedType | UploadErrorCode::FileTooLarge
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadErrorCode::UnsupportedType => "UNSUPPORTED_TYPE",
            UploadErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            UploadErrorCode::AuthError => "AUTH_ERROR",
            UploadErrorCode::ProcessingFailed => "PROCESSING_FAILED",
            UploadErrorCode::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNSUPPORTED_TYPE" => Some(UploadErrorCode::UnsupportedType),
            "FILE_TOO_LARGE" => Some(UploadErrorCode::FileTooLarge),
            "AUTH_ERROR" => Some(UploadErrorCode::AuthError),
            "PROCESSING_FAILED" => Some(UploadErrorCode::ProcessingFailed),
            "CANCELLED" => Some(UploadErrorCode::Cancelled),
            _ => None,
        }
    }
}

/// Error recorded on a queue item. Never propagated past the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadError {
    pub code: UploadErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl UploadError {
    pub fn new(code: UploadErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn cancelled() -> Self {
        Self::new(UploadErrorCode::Cancelled, "Upload cancelled")
    }

    pub fn not_authenticated() -> Self {
        Self::new(
            UploadErrorCode::AuthError,
            "Not authenticated, sign in and retry",
        )
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// A user-selected file. The bytes are shared and never mutated.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    /// Declared MIME type, if the source provided one.
    pub content_type: Option<String>,
    data: Arc<[u8]>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            name: name.into(),
            content_type: None,
            data: Arc::from(data),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Load a file from disk, sniffing its MIME type from the magic bytes.
    ///
    /// Text formats have no magic bytes, so they keep `content_type = None`
    /// and are validated by extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .with_context(|| format!("Invalid file name: {:?}", path))?;

        let mut file = UploadFile::new(name, data);
        if let Some(kind) = infer::get(&file.data) {
            file.content_type = Some(kind.mime_type().to_string());
        }
        Ok(file)
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Lowercased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

/// Parsed response of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Number of rows the server parsed from the file.
    pub row_count: u64,
    /// Number of rows/items the analysis flagged.
    pub flagged_count: u64,
    /// Full structured response as returned by the server.
    pub payload: Value,
}

impl UploadResult {
    /// Build a result from a server payload.
    ///
    /// Summary fields are read from top-level counters (`row_count`,
    /// `flagged_count`), a nested `summary` object, or derived from the
    /// lengths of `rows` and `anomalies` / `flagged_items`. Missing fields
    /// count as zero. Fails only when the payload is not a JSON object.
    pub fn from_payload(payload: Value) -> Result<Self, String> {
        let object = payload
            .as_object()
            .ok_or_else(|| format!("Expected a JSON object, got: {}", json_kind(&payload)))?;
        let summary = object.get("summary").and_then(Value::as_object);

        let counter = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_u64)
                .or_else(|| summary.and_then(|s| s.get(key)).and_then(Value::as_u64))
        };
        let array_len = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_array)
                .map(|a| a.len() as u64)
        };

        let row_count = counter("row_count").or_else(|| array_len("rows")).unwrap_or(0);
        let flagged_count = counter("flagged_count")
            .or_else(|| array_len("anomalies"))
            .or_else(|| array_len("flagged_items"))
            .unwrap_or(0);

        Ok(Self {
            row_count,
            flagged_count,
            payload,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One file moving through the upload pipeline.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Unique identifier (UUID), stable for the item's lifetime
    pub id: String,
    /// The file payload
    pub file: UploadFile,
    /// Caller-supplied tag forwarded to the upload request
    pub client_id: Option<String>,
    /// Current status in the state machine
    pub status: QueueStatus,
    /// Attempt progress, 0-100
    pub progress: u8,
    /// Set when status is Error or Cancelled
    pub error: Option<UploadError>,
    /// Set when status is Completed
    pub result: Option<UploadResult>,
    /// When the item was enqueued (Unix millis)
    pub created_at: i64,
    /// When the current attempt started
    pub started_at: Option<i64>,
    /// When the current attempt reached a terminal state
    pub completed_at: Option<i64>,
    /// Number of upload attempts started so far
    pub attempts: u32,
}

impl QueueItem {
    /// Create a new item waiting to be uploaded.
    pub fn new(id: String, file: UploadFile, client_id: Option<String>) -> Self {
        Self {
            id,
            file,
            client_id,
            status: QueueStatus::Ready,
            progress: 0,
            error: None,
            result: None,
            created_at: now_millis(),
            started_at: None,
            completed_at: None,
            attempts: 0,
        }
    }

    /// Create an item that failed validation at enqueue time.
    pub fn rejected(
        id: String,
        file: UploadFile,
        client_id: Option<String>,
        error: UploadError,
    ) -> Self {
        Self {
            status: QueueStatus::Error,
            error: Some(error),
            ..Self::new(id, file, client_id)
        }
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }
}

/// Coarse batch-level status used for UI gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Nothing queued
    Idle,
    /// At least one item waits to be uploaded
    Ready,
    /// A processing loop is running
    Processing,
    /// Every item reached a terminal state
    Complete,
}

/// Snapshot of the derived batch aggregates.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub is_processing: bool,
    pub total_files: usize,
    pub completed_files: usize,
    /// Items in Error or Cancelled
    pub failed_files: usize,
    pub overall_progress: u8,
}

/// Serializable view of a queue item, without the file bytes.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItemView {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub client_id: Option<String>,
    pub status: QueueStatus,
    pub progress: u8,
    pub error: Option<UploadError>,
    pub row_count: Option<u64>,
    pub flagged_count: Option<u64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub attempts: u32,
}

impl QueueItemView {
    pub fn from_queue_item(item: &QueueItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.file.name.clone(),
            size: item.file.size(),
            client_id: item.client_id.clone(),
            status: item.status,
            progress: item.progress,
            error: item.error.clone(),
            row_count: item.result.as_ref().map(|r| r.row_count),
            flagged_count: item.result.as_ref().map(|r| r.flagged_count),
            started_at: item.started_at,
            completed_at: item.completed_at,
            attempts: item.attempts,
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
