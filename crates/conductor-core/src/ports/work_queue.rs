//! WorkQueue port - dispatcher と pump loop の間の FIFO
//!
//! キューには (worker 名, task_id) だけを流す。Task 本体は worker の
//! テーブルが正本（source of truth）。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::TaskId;

/// One queued unit: which worker owns the task, and which task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub worker: String,
    pub task_id: TaskId,
}

impl WorkItem {
    pub fn new(worker: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            worker: worker.into(),
            task_id,
        }
    }
}

/// FIFO work queue shared by every pump loop.
///
/// # 設計原則
/// - 先に push された item から pop される
/// - pop は timeout 付きで待つ（pump loop が running フラグを見直せるように）
/// - 各 item はちょうど 1 回だけ pop される
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, item: WorkItem);

    /// Wait up to `timeout` for the next item. `None` on timeout.
    async fn pop(&self, timeout: Duration) -> Option<WorkItem>;

    /// Number of items waiting (not yet popped).
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
