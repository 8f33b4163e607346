//! EventSink implementations: tracing への出力と、メモリ上の記録。

use std::sync::Mutex;

use crate::domain::TaskEvent;
use crate::ports::EventSink;

/// Writes every lifecycle event as a `tracing` debug record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &TaskEvent) {
        tracing::debug!(
            target: "conductor::events",
            task_id = %event.task_id(),
            event = event.name(),
            "task lifecycle event"
        );
    }
}

/// Collects events in memory (audit trail for demos and tests).
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
