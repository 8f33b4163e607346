//! Events - タスクのライフサイクルイベント
//!
//! 各遷移（created / started / completed / failed）ごとに 1 件発行され、
//! `EventSink` に渡される。永続化などの外部ストアはここを購読する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::kind::TaskKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Created {
        task_id: TaskId,
        kind: TaskKind,
        worker: String,
        at: DateTime<Utc>,
    },
    Started {
        task_id: TaskId,
        worker: String,
        at: DateTime<Utc>,
    },
    Completed {
        task_id: TaskId,
        worker: String,
        at: DateTime<Utc>,
    },
    Failed {
        task_id: TaskId,
        worker: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Created { task_id, .. }
            | TaskEvent::Started { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. } => *task_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Created { .. } => "created",
            TaskEvent::Started { .. } => "started",
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::Failed { .. } => "failed",
        }
    }
}
