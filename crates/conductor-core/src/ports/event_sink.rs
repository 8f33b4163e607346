//! EventSink port - ライフサイクルイベントの書き出し先
//!
//! 書き込み専用。core は sink の結果を見ないので、sink の失敗が
//! タスク実行に影響することはない。
//!
//! # 実装
//! - NoopEventSink（デフォルト）
//! - TracingEventSink / InMemoryEventSink（impls）

use crate::domain::TaskEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TaskEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &TaskEvent) {}
}
