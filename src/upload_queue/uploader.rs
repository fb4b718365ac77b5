//! HTTP client for the analysis upload endpoint.
//!
//! Sends one file per multipart request and returns the raw JSON payload;
//! parsing into an `UploadResult` is left to the controller.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use super::models::UploadFile;
use super::validation::mime_types_for;

/// One upload attempt.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: UploadFile,
    pub client_id: Option<String>,
}

/// Failure reported by an [`Uploader`].
#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("Upload rejected with status {status}")]
    Rejected { status: u16, detail: Option<String> },

    #[error("Upload request failed: {0}")]
    Transport(String),

    #[error("Invalid upload response: {0}")]
    InvalidResponse(String),
}

impl UploadFailure {
    /// Human-readable detail to store on the failed item.
    pub fn detail(&self) -> Option<String> {
        match self {
            UploadFailure::Rejected { detail, .. } => detail.clone(),
            UploadFailure::Transport(msg) | UploadFailure::InvalidResponse(msg) => {
                Some(msg.clone())
            }
        }
    }
}

/// The remote upload endpoint.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload one file and return the success payload.
    async fn upload(&self, request: UploadRequest, bearer_token: &str)
        -> Result<Value, UploadFailure>;
}

/// reqwest-backed [`Uploader`].
#[derive(Clone)]
pub struct HttpUploader {
    client: Client,
    upload_url: String,
}

impl HttpUploader {
    /// Create a new HttpUploader.
    ///
    /// # Arguments
    /// * `upload_url` - Full URL of the upload endpoint
    /// * `timeout_secs` - Optional per-request timeout; None keeps the transport default
    pub fn new(upload_url: String, timeout_secs: Option<u64>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self { client, upload_url })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    fn build_form(request: UploadRequest) -> Result<Form, UploadFailure> {
        let mime = request
            .file
            .content_type
            .clone()
            .unwrap_or_else(|| guess_mime_type(&request.file).to_string());

        let part = Part::bytes(request.file.bytes().to_vec())
            .file_name(request.file.name.clone())
            .mime_str(&mime)
            .map_err(|e| UploadFailure::Transport(format!("Invalid MIME type {}: {}", mime, e)))?;

        let mut form = Form::new().part("file", part);
        if let Some(client_id) = request.client_id {
            form = form.text("client_id", client_id);
        }
        Ok(form)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(
        &self,
        request: UploadRequest,
        bearer_token: &str,
    ) -> Result<Value, UploadFailure> {
        let form = Self::build_form(request)?;

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(bearer_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadFailure::Rejected {
                status: status.as_u16(),
                detail: extract_error_detail(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| UploadFailure::InvalidResponse(e.to_string()))
    }
}

/// Longest error detail kept from a response body, in characters.
const MAX_ERROR_DETAIL_CHARS: usize = 512;

/// Pull a readable message out of an error body.
///
/// Accepts `{"detail": ...}`, `{"message": ...}` or `{"error": ...}`, falling
/// back to the raw text. The result is capped at `MAX_ERROR_DETAIL_CHARS`.
fn extract_error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            match map.get(key) {
                Some(Value::String(s)) => return Some(truncate_detail(s)),
                Some(Value::Null) | None => continue,
                Some(other) => return Some(truncate_detail(&other.to_string())),
            }
        }
    }

    Some(truncate_detail(body))
}

fn truncate_detail(detail: &str) -> String {
    match detail.char_indices().nth(MAX_ERROR_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", &detail[..cut]),
        None => detail.to_string(),
    }
}

fn guess_mime_type(file: &UploadFile) -> &'static str {
    file.extension()
        .and_then(|ext| mime_types_for(&ext).first().copied())
        .unwrap_or("application/octet-stream")
}
