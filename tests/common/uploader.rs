//! Hand-written fake for the upload endpoint

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use diagnostics_uploader::upload_queue::{UploadFailure, UploadRequest, Uploader};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use super::constants::TRANSIENT_FAILURE_DETAIL;
use super::fixtures::analysis_payload;

/// One call received by [`MockUploader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub file_name: String,
    pub client_id: Option<String>,
    pub bearer_token: String,
}

/// Blocks each upload until the test releases it.
struct Gate {
    entered: Notify,
    release: Semaphore,
}

/// Fake [`Uploader`] that records calls and answers with a fixed payload.
///
/// Failures can be scripted per file name, and a gated uploader parks every
/// request until the test releases it, which lets tests act while an upload
/// is in flight.
pub struct MockUploader {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<String, usize>>,
    payload: Value,
    gate: Option<Gate>,
}

impl MockUploader {
    /// Every upload succeeds.
    pub fn succeeding() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            payload: analysis_payload(),
            gate: None,
        }
    }

    /// Every upload waits for [`MockUploader::release_one`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Gate {
                entered: Notify::new(),
                release: Semaphore::new(0),
            }),
            ..Self::succeeding()
        }
    }

    /// The next `times` uploads of `file_name` are rejected with a 503.
    pub fn failing(self, file_name: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), times);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Wait until an upload has reached the gate.
    pub async fn wait_until_entered(&self) {
        let gate = self.gate.as_ref().expect("uploader is not gated");
        gate.entered.notified().await;
    }

    /// Let one parked upload complete.
    pub fn release_one(&self) {
        let gate = self.gate.as_ref().expect("uploader is not gated");
        gate.release.add_permits(1);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.file_name).collect()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(
        &self,
        request: UploadRequest,
        bearer_token: &str,
    ) -> Result<Value, UploadFailure> {
        self.calls.lock().unwrap().push(RecordedCall {
            file_name: request.file.name.clone(),
            client_id: request.client_id.clone(),
            bearer_token: bearer_token.to_string(),
        });

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release
                .acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
        }

        let should_fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&request.file.name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        if should_fail {
            return Err(UploadFailure::Rejected {
                status: 503,
                detail: Some(TRANSIENT_FAILURE_DETAIL.to_string()),
            });
        }
        Ok(self.payload.clone())
    }
}
