//! DispatcherBuilder - 起動時のワイヤリングと検証
//!
//! # Fail-fast 設計
//! - expect_kinds() で「必ず扱えるべき kind」を宣言
//! - build() 時に「期待集合 ⊆ 登録済み worker の capability の和集合」をチェック
//! - 不足があれば BuildError を返す

use std::sync::Arc;

use crate::app::dispatcher::Dispatcher;
use crate::app::registry::WorkerRegistry;
use crate::config::DispatcherConfig;
use crate::domain::TaskKind;
use crate::impls::InMemoryWorkQueue;
use crate::ports::{EventSink, WorkQueue};
use crate::worker::Worker;

/// # 使用例
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .config(config)
///     .register(Worker::new("content_creator", ["blog_post"], ContentExecutor))
///     .expect_kinds(&["blog_post"])
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    workers: Vec<Worker>,
    expected_kinds: Option<Vec<TaskKind>>,
    event_sink: Option<Arc<dyn EventSink>>,
    queue: Option<Arc<dyn WorkQueue>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task kinds: {0:?}. These kinds were expected but no registered worker handles them.")]
    MissingKinds(Vec<String>),
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
            workers: Vec::new(),
            expected_kinds: None,
            event_sink: None,
            queue: None,
        }
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(mut self, worker: Worker) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn expect_kinds(mut self, kinds: &[&str]) -> Self {
        self.expected_kinds = Some(kinds.iter().map(|&k| TaskKind::new(k)).collect());
        self
    }

    /// Sink for every worker's lifecycle events, including workers added
    /// later with `Dispatcher::register`. Overrides any sink set on the
    /// workers themselves.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let mut registry = WorkerRegistry::new();
        for worker in self.workers {
            let worker = match &self.event_sink {
                Some(sink) => worker.event_sink(Arc::clone(sink)),
                None => worker,
            };
            if registry.register(Arc::new(worker)).is_some() {
                tracing::warn!("worker registered twice, keeping the last one");
            }
        }

        if let Some(expected) = &self.expected_kinds {
            let registered = registry.kinds();
            let missing: Vec<String> = expected
                .iter()
                .filter(|kind| !registered.contains(*kind))
                .map(|kind| kind.to_string())
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingKinds(missing));
            }
        }

        for worker in registry.iter() {
            let capabilities: Vec<&str> = worker.capabilities().map(TaskKind::as_str).collect();
            tracing::info!(worker = %worker.name(), ?capabilities, "registered worker");
        }

        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryWorkQueue::new()));
        Ok(Dispatcher::from_parts(
            self.config,
            registry,
            queue,
            self.event_sink,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
