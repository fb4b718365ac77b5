//! Upload queue storage.
//!
//! Holds the ordered item list and the batch control state. Every mutation
//! goes through one of the named transitions below and emits a
//! [`QueueEvent`]; aggregates are derived on read.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{QueueEvent, EVENT_CHANNEL_CAPACITY};
use super::models::*;
use super::validation::{validate_file, ValidationRules};

/// Default maximum number of items held by the queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 20;

/// Handle for one processing loop.
#[derive(Debug, Clone)]
pub struct ProcessingRun {
    /// Increases with every loop started on this store.
    pub generation: u64,
    pub token: CancellationToken,
}

/// In-memory upload queue.
///
/// Transitions are keyed by item id and return `false` when the id is not
/// present, which makes late updates for removed items harmless.
pub struct QueueStore {
    items: Vec<QueueItem>,
    max_queue_size: usize,
    is_processing: bool,
    /// Present only while a processing loop runs.
    cancel_token: Option<CancellationToken>,
    run_generation: u64,
    event_tx: broadcast::Sender<QueueEvent>,
}

impl QueueStore {
    /// Create an empty store holding at most `max_queue_size` items.
    pub fn new(max_queue_size: usize) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            items: Vec::new(),
            max_queue_size,
            is_processing: false,
            cancel_token: None,
            run_generation: 0,
            event_tx,
        }
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Change the cap for later enqueues. Existing items are not evicted.
    pub fn set_max_queue_size(&mut self, max_queue_size: usize) {
        self.max_queue_size = max_queue_size;
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    // =========================================================================
    // Queue Management
    // =========================================================================

    /// Validate and enqueue files, returning the ids of the new items.
    ///
    /// Valid files enter as `Ready`, invalid ones as `Error` carrying the
    /// validation error. Files beyond the queue cap are dropped.
    pub fn enqueue_files(
        &mut self,
        files: Vec<UploadFile>,
        client_id: Option<&str>,
        rules: &ValidationRules,
    ) -> Vec<String> {
        if files.is_empty() {
            return Vec::new();
        }

        let available = self.max_queue_size.saturating_sub(self.items.len());
        if files.len() > available {
            // TODO: surface a "queue full" outcome to callers instead of dropping silently
            warn!(
                "Upload queue is full ({} max), dropping {} of {} files",
                self.max_queue_size,
                files.len() - available,
                files.len()
            );
        }

        let mut ids = Vec::new();
        for file in files.into_iter().take(available) {
            let id = Uuid::new_v4().to_string();
            let client_id = client_id.map(|c| c.to_string());
            let item = match validate_file(&file, rules) {
                Ok(()) => QueueItem::new(id.clone(), file, client_id),
                Err(e) => {
                    debug!("Rejected {}: {}", file.name, e);
                    QueueItem::rejected(id.clone(), file, client_id, e.into())
                }
            };

            self.emit(QueueEvent::ItemAdded {
                id: item.id.clone(),
                name: item.file.name.clone(),
                status: item.status,
            });
            self.items.push(item);
            ids.push(id);
        }
        ids
    }

    /// Remove an item. Returns false if it was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        let removed = self.items.len() != before;
        if removed {
            self.emit(QueueEvent::ItemRemoved { id: id.to_string() });
        }
        removed
    }

    /// Empty the queue and drop the processing state.
    ///
    /// Callers cancel any running loop first, see `BatchController::clear_queue`.
    pub fn clear(&mut self) {
        self.items.clear();
        self.is_processing = false;
        self.cancel_token = None;
        self.emit(QueueEvent::QueueCleared);
    }

    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// All items in enqueue order.
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Ids of items in the given status, in enqueue order.
    pub fn ids_with_status(&self, status: QueueStatus) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| i.status == status)
            .map(|i| i.id.clone())
            .collect()
    }

    // =========================================================================
    // State Transitions
    // =========================================================================

    /// Set the status of an item, replacing its error.
    ///
    /// Leaving `Completed` drops the result. Terminal states stamp
    /// `completed_at` once per attempt.
    pub fn update_status(
        &mut self,
        id: &str,
        status: QueueStatus,
        error: Option<UploadError>,
    ) -> bool {
        let Some(item) = self.item_mut(id) else {
            return false;
        };

        item.status = status;
        item.error = error;
        if status != QueueStatus::Completed {
            item.result = None;
        }
        if status.is_terminal() && item.started_at.is_some() && item.completed_at.is_none() {
            item.completed_at = Some(now_millis());
        }

        self.emit(QueueEvent::StatusChanged {
            id: id.to_string(),
            status,
        });
        true
    }

    /// Set the progress of an item, clamped to 100.
    pub fn update_progress(&mut self, id: &str, progress: u8) -> bool {
        let progress = progress.min(100);
        let Some(item) = self.item_mut(id) else {
            return false;
        };
        item.progress = progress;

        self.emit(QueueEvent::ProgressChanged {
            id: id.to_string(),
            progress,
        });
        true
    }

    /// Attach a parsed result and clear any error.
    pub fn update_result(&mut self, id: &str, result: UploadResult) -> bool {
        let Some(item) = self.item_mut(id) else {
            return false;
        };
        item.result = Some(result);
        item.error = None;
        true
    }

    /// Begin an attempt: `Processing`, stamp `started_at`.
    ///
    /// Returns the attempt number, or None if the id is not present.
    pub fn mark_started(&mut self, id: &str) -> Option<u32> {
        let item = self.item_mut(id)?;
        item.attempts += 1;
        let attempt = item.attempts;
        item.status = QueueStatus::Processing;
        item.error = None;
        item.result = None;
        item.started_at = Some(now_millis());
        item.completed_at = None;

        self.emit(QueueEvent::StatusChanged {
            id: id.to_string(),
            status: QueueStatus::Processing,
        });
        Some(attempt)
    }

    /// Whether a response for `attempt` may still be applied to the item.
    ///
    /// False once the item is gone, has been reset to `Ready`, or has been
    /// restarted by a later attempt.
    pub fn is_current_attempt(&self, id: &str, attempt: u32) -> bool {
        self.get(id)
            .is_some_and(|i| i.attempts == attempt && i.status != QueueStatus::Ready)
    }

    /// Reset an item for another attempt.
    pub fn reset_to_ready(&mut self, id: &str) -> bool {
        let Some(item) = self.item_mut(id) else {
            return false;
        };
        item.status = QueueStatus::Ready;
        item.progress = 0;
        item.error = None;
        item.result = None;
        item.started_at = None;
        item.completed_at = None;

        self.emit(QueueEvent::StatusChanged {
            id: id.to_string(),
            status: QueueStatus::Ready,
        });
        true
    }

    // =========================================================================
    // Processing State
    // =========================================================================

    /// Mark the batch as processing and hand out a fresh cancellation token.
    ///
    /// Returns None if a loop is already running.
    pub fn begin_processing(&mut self) -> Option<ProcessingRun> {
        if self.is_processing {
            return None;
        }
        let token = CancellationToken::new();
        self.run_generation += 1;
        self.is_processing = true;
        self.cancel_token = Some(token.clone());
        Some(ProcessingRun {
            generation: self.run_generation,
            token,
        })
    }

    /// Clear the processing flag and drop the token.
    ///
    /// Only the loop that currently owns the batch can finish it: after a
    /// `clear` a newer loop may already be running. Returns false for a
    /// stale generation.
    pub fn finish_processing(&mut self, generation: u64) -> bool {
        if !self.is_processing || generation != self.run_generation {
            return false;
        }
        self.is_processing = false;
        self.cancel_token = None;
        true
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancel_token.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub(crate) fn emit_batch_event(&self, event: QueueEvent) {
        self.emit(event);
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    pub fn total_files(&self) -> usize {
        self.items.len()
    }

    pub fn completed_files(&self) -> usize {
        self.count(|s| s == QueueStatus::Completed)
    }

    /// Items in `Error` or `Cancelled`.
    pub fn failed_files(&self) -> usize {
        self.count(|s| s.is_retryable())
    }

    fn count(&self, predicate: impl Fn(QueueStatus) -> bool) -> usize {
        self.items.iter().filter(|i| predicate(i.status)).count()
    }

    /// Mean progress over all items, rounded down.
    ///
    /// Rounding down keeps 100 reserved for a fully completed batch.
    pub fn overall_progress(&self) -> u8 {
        if self.items.is_empty() {
            return 0;
        }
        let sum: usize = self.items.iter().map(|i| i.progress as usize).sum();
        (sum / self.items.len()) as u8
    }

    pub fn status(&self) -> BatchStatus {
        if self.items.is_empty() {
            return BatchStatus::Idle;
        }
        if self.is_processing {
            return BatchStatus::Processing;
        }
        if self.items.iter().any(|i| i.status == QueueStatus::Ready) {
            return BatchStatus::Ready;
        }
        if self.items.iter().all(|i| i.status.is_terminal()) {
            return BatchStatus::Complete;
        }
        // An item is still mid-attempt after its loop was cancelled
        BatchStatus::Processing
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            status: self.status(),
            is_processing: self.is_processing,
            total_files: self.total_files(),
            completed_files: self.completed_files(),
            failed_files: self.failed_files(),
            overall_progress: self.overall_progress(),
        }
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_SIZE)
    }
}
