use serde::Serialize;
use tokio::sync::broadcast;

use episodic_core::models::FlagAction;

use crate::traits::EventSink;

const DEFAULT_CAPACITY: usize = 256;

/// Data set whose observers should reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTopic {
    Episodes,
    Shows,
}

/// Everything the tasks report while they run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A flag task finished. `success` is the remote outcome when trakt is
    /// involved, `true` otherwise.
    FlagCompleted {
        action: FlagAction,
        show_id: i64,
        item_id: i64,
        success: bool,
    },
    /// Short user-facing status of a flag task that went to trakt.
    FlagStatus { message: String, success: bool },
    /// Progress of an add-show run. `show_id` is `None` when the whole run
    /// was aborted; `message` is `None` for a plain success.
    ShowAdded {
        show_id: Option<i64>,
        message: Option<String>,
        successful: bool,
    },
    /// An add-show run drained its queue.
    AddShowsFinished { added: usize, merge_completed: bool },
    DataChanged { topic: ChangeTopic },
}

/// In-process event bus. Publishing with no subscribers is fine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: TaskEvent) {
        tracing::trace!(?event, "Publishing event");
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}
