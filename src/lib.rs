//! Diagnostics Uploader Library
//!
//! Client-side batch upload queue for statement and ledger files: validation,
//! sequential upload, cooperative cancellation and retry of failed items.

pub mod config;
pub mod upload_queue;

// Re-export commonly used types for convenience
pub use upload_queue::{
    BatchController, BatchStatus, CredentialProvider, HttpUploader, QueueItem, QueueStatus,
    StaticCredentials, UploadError, UploadErrorCode, UploadFile, Uploader,
};
