//! Test fixtures: files, payloads and controllers

#![allow(dead_code)]

use std::sync::Arc;

use diagnostics_uploader::upload_queue::{
    BatchController, QueueStatus, StaticCredentials, UploadFile, DEFAULT_MAX_FILE_SIZE,
};
use serde_json::{json, Value};

use super::constants::{ANALYSIS_FLAGGED_COUNT, ANALYSIS_ROW_COUNT};
use super::uploader::MockUploader;

/// A small, valid CSV statement.
pub fn csv_file(name: &str) -> UploadFile {
    UploadFile::new(
        name,
        b"date,description,amount\n2024-01-02,Coffee,-3.50\n2024-01-03,Salary,2500.00\n".to_vec(),
    )
}

/// A CSV one byte over the default size limit.
pub fn oversized_file(name: &str) -> UploadFile {
    UploadFile::new(name, vec![b'x'; DEFAULT_MAX_FILE_SIZE as usize + 1])
}

/// A file whose type is not accepted.
pub fn unsupported_file(name: &str) -> UploadFile {
    UploadFile::new(name, b"%PDF-1.7".to_vec()).with_content_type("application/pdf")
}

/// Success body of the analysis endpoint.
pub fn analysis_payload() -> Value {
    json!({
        "summary": {
            "row_count": ANALYSIS_ROW_COUNT,
            "flagged_count": ANALYSIS_FLAGGED_COUNT
        },
        "anomalies": [
            {"row": 3, "reason": "duplicate"},
            {"row": 9, "reason": "outlier"}
        ]
    })
}

/// Controller backed by `uploader`, authenticated when `token` is set.
pub fn controller_with(uploader: Arc<MockUploader>, token: Option<&str>) -> Arc<BatchController> {
    let credentials = Arc::new(StaticCredentials::new(token.map(|t| t.to_string())));
    Arc::new(BatchController::new(uploader, credentials))
}

/// Controller backed by `uploader` that shares `credentials` with the test.
pub fn controller_with_credentials(
    uploader: Arc<MockUploader>,
    credentials: Arc<StaticCredentials>,
) -> Arc<BatchController> {
    Arc::new(BatchController::new(uploader, credentials))
}

/// Statuses of all items in queue order.
pub fn statuses(controller: &BatchController) -> Vec<QueueStatus> {
    controller.files().iter().map(|i| i.status).collect()
}
