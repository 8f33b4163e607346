use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::TaskKind;
use crate::worker::Worker;

/// Registry of workers, in registration order.
///
/// Design:
/// - Built at startup, read-mostly afterwards.
/// - Registering a name that already exists replaces that worker in place
///   ("last wins"), keeping its original position for first-match routing.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<Arc<Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the worker that was replaced, if any.
    pub fn register(&mut self, worker: Arc<Worker>) -> Option<Arc<Worker>> {
        match self.workers.iter_mut().find(|w| w.name() == worker.name()) {
            Some(slot) => Some(std::mem::replace(slot, worker)),
            None => {
                self.workers.push(worker);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Worker>> {
        self.workers.iter().find(|w| w.name() == name)
    }

    /// First registered worker whose capabilities include `kind`.
    pub fn find_for(&self, kind: &TaskKind) -> Option<&Arc<Worker>> {
        self.workers.iter().find(|w| w.can_handle(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Worker>> {
        self.workers.iter()
    }

    /// Union of every registered worker's capabilities.
    pub fn kinds(&self) -> BTreeSet<TaskKind> {
        self.workers
            .iter()
            .flat_map(|w| w.capabilities().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
