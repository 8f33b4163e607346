//! Status - 集計スナップショット
//!
//! グローバルな ledger と、各 worker 自身のテーブルから呼び出し時点で計算する。
//! worker 側の数には、まだ ledger に載っていない Running のタスクも含まれる。

use serde::{Deserialize, Serialize};

use crate::domain::TaskKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// `completed + failed` in the global ledgers.
    pub total_terminal: usize,
    pub completed: usize,
    pub failed: usize,
    /// `completed / total_terminal`, or `0.0` when nothing has finished.
    pub success_rate: f64,
    /// Items enqueued but not yet picked up by a pump loop.
    pub queue_depth: usize,
    pub is_running: bool,
    /// One entry per worker, in registration order.
    pub workers: Vec<WorkerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub name: String,
    pub capabilities: Vec<TaskKind>,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

impl StatusSnapshot {
    pub fn worker(&self, name: &str) -> Option<&WorkerStatus> {
        self.workers.iter().find(|w| w.name == name)
    }
}

/// `part / whole`, defined as `0.0` when `whole == 0`.
pub(crate) fn success_rate(completed: usize, failed: usize) -> f64 {
    let total = completed + failed;
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    }
}
