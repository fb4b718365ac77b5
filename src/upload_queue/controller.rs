//! Batch controller.
//!
//! Owns the queue store, the cancellation signal for the running loop and
//! the collaborators used to upload files. All operations are driven by the
//! caller; nothing runs in the background.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::credentials::CredentialProvider;
use super::events::QueueEvent;
use super::models::*;
use super::queue_store::{QueueStore, DEFAULT_MAX_QUEUE_SIZE};
use super::uploader::{UploadFailure, UploadRequest, Uploader};
use super::validation::{validate_file, ValidationRules};
use crate::config::UploadQueueSettings;

/// Progress once the request has been issued.
pub const PROGRESS_REQUEST_ISSUED: u8 = 10;
/// Progress once a success response has been received.
pub const PROGRESS_RESPONSE_RECEIVED: u8 = 60;
/// Progress of a completed item.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Drives the upload queue.
///
/// Share it behind an `Arc`: `process_all` holds `&self` across uploads
/// while `cancel_processing` and the read accessors stay callable.
pub struct BatchController {
    store: Mutex<QueueStore>,
    uploader: Arc<dyn Uploader>,
    credentials: Arc<dyn CredentialProvider>,
    rules: ValidationRules,
}

impl BatchController {
    /// Create a controller with default validation rules and queue cap.
    pub fn new(uploader: Arc<dyn Uploader>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            store: Mutex::new(QueueStore::new(DEFAULT_MAX_QUEUE_SIZE)),
            uploader,
            credentials,
            rules: ValidationRules::default(),
        }
    }

    /// Create a controller from resolved settings.
    pub fn from_settings(
        uploader: Arc<dyn Uploader>,
        credentials: Arc<dyn CredentialProvider>,
        settings: &UploadQueueSettings,
    ) -> Self {
        Self::new(uploader, credentials)
            .with_max_queue_size(settings.max_queue_size)
            .with_rules(settings.validation_rules())
    }

    pub fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    /// Set the queue cap. Items already queued are kept.
    pub fn with_max_queue_size(self, max_queue_size: usize) -> Self {
        self.store().set_max_queue_size(max_queue_size);
        self
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn max_queue_size(&self) -> usize {
        self.store().max_queue_size()
    }

    fn store(&self) -> MutexGuard<'_, QueueStore> {
        self.store.lock().unwrap()
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.store().subscribe()
    }

    // =========================================================================
    // Queue Management
    // =========================================================================

    /// Validate and enqueue files. Returns the ids of the items created.
    pub fn add_files(&self, files: Vec<UploadFile>, client_id: Option<&str>) -> Vec<String> {
        let ids = self.store().enqueue_files(files, client_id, &self.rules);
        if !ids.is_empty() {
            debug!("Added {} files to the upload queue", ids.len());
        }
        ids
    }

    /// Remove a file from the queue. Returns false if it was not present.
    pub fn remove_file(&self, id: &str) -> bool {
        self.store().remove(id)
    }

    /// Cancel any running loop, then empty the queue.
    pub fn clear_queue(&self) {
        self.cancel_processing();
        self.store().clear();
        info!("Upload queue cleared");
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Upload one `Ready` item. No-op for any other status or unknown id.
    ///
    /// Failures are recorded on the item; nothing is returned to the caller.
    pub async fn process_file(&self, id: &str) {
        self.attempt(id, None).await;
    }

    /// Run one upload attempt.
    ///
    /// With a run token, an item reached after cancellation is marked
    /// `Cancelled` instead of being started. The token is checked under the
    /// store lock, so `cancel_processing` either sees the item `Processing`
    /// or the attempt sees the cancelled token.
    ///
    /// The response is applied only while the item is still on this
    /// attempt. Once a retry has reset or restarted it, the response is
    /// dropped.
    async fn attempt(&self, id: &str, run_token: Option<&CancellationToken>) {
        let (request, bearer_token, attempt) = {
            let mut store = self.store();
            let Some(item) = store.get(id).filter(|i| i.status == QueueStatus::Ready) else {
                debug!("Skipping {}: not ready", id);
                return;
            };
            let request = UploadRequest {
                file: item.file.clone(),
                client_id: item.client_id.clone(),
            };

            if run_token.is_some_and(|t| t.is_cancelled()) {
                store.update_status(id, QueueStatus::Cancelled, Some(UploadError::cancelled()));
                return;
            }

            let Some(bearer_token) = self.credentials.bearer_token() else {
                warn!("Not authenticated, cannot upload {}", request.file.name);
                store.update_status(
                    id,
                    QueueStatus::Error,
                    Some(UploadError::not_authenticated()),
                );
                return;
            };

            let Some(attempt) = store.mark_started(id) else {
                return;
            };
            store.update_progress(id, PROGRESS_REQUEST_ISSUED);
            (request, bearer_token, attempt)
        };

        let name = request.file.name.clone();
        debug!("Uploading {} ({} bytes)", name, request.file.size());

        let outcome = self.uploader.upload(request, &bearer_token).await;

        let mut store = self.store();
        if !store.is_current_attempt(id, attempt) {
            debug!("Discarding stale response for {} (attempt {})", name, attempt);
            return;
        }
        match outcome {
            Ok(payload) => {
                store.update_progress(id, PROGRESS_RESPONSE_RECEIVED);
                match UploadResult::from_payload(payload) {
                    Ok(result) => {
                        info!(
                            "Uploaded {}: {} rows, {} flagged",
                            name, result.row_count, result.flagged_count
                        );
                        store.update_progress(id, PROGRESS_COMPLETE);
                        store.update_result(id, result);
                        store.update_status(id, QueueStatus::Completed, None);
                    }
                    Err(e) => Self::fail(&mut store, id, &name, UploadFailure::InvalidResponse(e)),
                }
            }
            Err(failure) => Self::fail(&mut store, id, &name, failure),
        }
    }

    fn fail(store: &mut QueueStore, id: &str, name: &str, failure: UploadFailure) {
        warn!("Upload of {} failed: {}", name, failure);
        let error = UploadError::new(UploadErrorCode::ProcessingFailed, failure.to_string())
            .with_details(failure.detail());

        store.update_status(id, QueueStatus::Error, Some(error));
        store.update_progress(id, 0);
    }

    /// Upload every `Ready` item, one at a time in enqueue order.
    ///
    /// No-op when nothing is ready or a loop is already running. Once
    /// cancelled, the remaining items are drained to `Cancelled`.
    pub async fn process_all(&self) {
        let (ids, run) = {
            let mut store = self.store();
            let ids = store.ids_with_status(QueueStatus::Ready);
            if ids.is_empty() {
                debug!("No ready files to process");
                return;
            }
            let Some(run) = store.begin_processing() else {
                warn!("Upload batch already in progress, ignoring request");
                return;
            };
            store.emit_batch_event(QueueEvent::BatchStarted { total: ids.len() });
            (ids, run)
        };

        info!("Processing {} queued files", ids.len());

        for id in &ids {
            self.attempt(id, Some(&run.token)).await;
        }

        let mut store = self.store();
        if store.finish_processing(run.generation) {
            let completed = store.completed_files();
            let failed = store.failed_files();
            store.emit_batch_event(QueueEvent::BatchFinished { completed, failed });
            info!(
                "Upload batch finished: {} completed, {} failed",
                completed, failed
            );
        } else {
            debug!("Upload batch {} superseded", run.generation);
        }
    }

    /// Signal the running loop to stop and mark in-flight items cancelled.
    ///
    /// The in-flight request is not aborted. Its response is still applied
    /// when it arrives and replaces the `Cancelled` label.
    pub fn cancel_processing(&self) {
        let mut store = self.store();
        if let Some(token) = store.cancellation_token() {
            token.cancel();
        }

        let in_flight = store.ids_with_status(QueueStatus::Processing);
        for id in &in_flight {
            store.update_status(id, QueueStatus::Cancelled, Some(UploadError::cancelled()));
            store.update_progress(id, 0);
        }

        if store.is_processing() || !in_flight.is_empty() {
            info!(
                "Upload processing cancelled ({} in flight)",
                in_flight.len()
            );
        }
    }

    /// Requeue failed and cancelled items, then process the batch.
    ///
    /// Each item is validated again; one that still fails validation keeps
    /// `Error` with a fresh validation error and is not uploaded.
    pub async fn retry_failed(&self) {
        let requeued = {
            let mut store = self.store();
            let candidates: Vec<String> = store
                .items()
                .iter()
                .filter(|i| i.status.is_retryable())
                .map(|i| i.id.clone())
                .collect();

            let mut requeued = 0;
            for id in &candidates {
                let Some(item) = store.get(id) else {
                    continue;
                };
                match validate_file(&item.file, &self.rules) {
                    Ok(()) => {
                        store.reset_to_ready(id);
                        requeued += 1;
                    }
                    Err(e) => {
                        store.update_status(id, QueueStatus::Error, Some(e.into()));
                    }
                }
            }
            requeued
        };

        if requeued > 0 {
            info!("Retrying {} failed uploads", requeued);
        }
        self.process_all().await;
    }

    // =========================================================================
    // Read Access
    // =========================================================================

    /// Snapshot of all items in enqueue order.
    pub fn files(&self) -> Vec<QueueItem> {
        self.store().items().to_vec()
    }

    pub fn item(&self, id: &str) -> Option<QueueItem> {
        self.store().get(id).cloned()
    }

    pub fn status(&self) -> BatchStatus {
        self.store().status()
    }

    pub fn total_files(&self) -> usize {
        self.store().total_files()
    }

    pub fn completed_files(&self) -> usize {
        self.store().completed_files()
    }

    pub fn failed_files(&self) -> usize {
        self.store().failed_files()
    }

    pub fn is_processing(&self) -> bool {
        self.store().is_processing()
    }

    pub fn overall_progress(&self) -> u8 {
        self.store().overall_progress()
    }

    pub fn summary(&self) -> BatchSummary {
        self.store().summary()
    }
}
