//! Upload queue module
//!
//! Provides an in-memory, single-session queue that validates user-selected
//! files and uploads them one at a time to the analysis endpoint.

mod controller;
mod credentials;
mod events;
mod models;
mod queue_store;
mod uploader;
mod validation;

pub use controller::BatchController;
pub use credentials::{CredentialProvider, StaticCredentials};
pub use events::QueueEvent;
pub use models::*;
pub use queue_store::{ProcessingRun, QueueStore, DEFAULT_MAX_QUEUE_SIZE};
pub use uploader::{HttpUploader, UploadFailure, UploadRequest, Uploader};
pub use validation::{
    mime_types_for, validate_file, ValidationError, ValidationRules, DEFAULT_MAX_FILE_SIZE,
    SUPPORTED_EXTENSIONS,
};
