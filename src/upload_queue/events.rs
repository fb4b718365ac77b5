//! Queue events for observers.
//!
//! Every store transition emits one event over a broadcast channel so a UI
//! can redraw without polling. Events describe state, they are not an error
//! channel: failures are read from the item itself.

use serde::Serialize;

use super::models::QueueStatus;

/// Capacity of the broadcast channel. Slow receivers see `Lagged`.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    ItemAdded {
        id: String,
        name: String,
        status: QueueStatus,
    },
    ItemRemoved {
        id: String,
    },
    StatusChanged {
        id: String,
        status: QueueStatus,
    },
    ProgressChanged {
        id: String,
        progress: u8,
    },
    QueueCleared,
    BatchStarted {
        total: usize,
    },
    BatchFinished {
        completed: usize,
        failed: usize,
    },
}
