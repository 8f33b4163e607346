//! Errors - エラー型と分類
//!
//! - `RoutingError`: submit が task を振り分けられなかった（呼び出し側に返す唯一のエラー）
//! - `ExecutionError`: Executor の失敗。Task に `Failed` として記録され、外には出ない
//! - `TransitionError`: 状態機械に反する遷移
//! - `PoolError`: pump loop の起動失敗
//! - `ConfigError`: 設定の読み込み失敗

use thiserror::Error;

use super::kind::TaskKind;
use super::state::TaskStatus;

/// Returned from `Dispatcher::submit` when a task cannot be routed.
/// Nothing is enqueued when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no registered worker can handle task kind {0}")]
    NoCapableWorker(TaskKind),

    #[error("worker {0} is not registered")]
    UnknownWorker(String),

    #[error("worker {worker} cannot handle task kind {kind}")]
    WorkerCannotHandle { worker: String, kind: TaskKind },
}

/// Failure raised by an `Executor`. The message becomes `Task::error` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("invalid payload: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid task transition {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pump pool size must be at least 1")]
    EmptyPool,

    #[error("pump pool is already running")]
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
