//! conductor-core
//!
//! Capability-routed task dispatch: typed work items go to the worker that
//! declares the matching capability, run on a pool of pump loops, and land
//! in completed/failed ledgers.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, kind, task, state, events, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, WorkQueue, EventSink）
//! - **worker**: Executor trait と、タスクを状態機械に沿って進める Worker
//! - **app**: Dispatcher, pump loop, workflow runner, status
//! - **impls**: ports のプロセス内実装
//! - **config**: 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod worker;

pub use app::{
    BuildError, Dispatcher, DispatcherBuilder, StatusSnapshot, WorkerStatus, WorkflowRunner,
    WorkflowStep,
};
pub use config::DispatcherConfig;
pub use domain::{
    ExecutionError, PoolError, RoutingError, Task, TaskEvent, TaskId, TaskKind, TaskStatus,
};
pub use worker::{Executor, FnExecutor, TaskCounts, Worker};
