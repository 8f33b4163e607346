//! Impls - ports のプロセス内実装
//!
//! # 含まれる実装
//! - **InMemoryWorkQueue**: pump loop が共有する FIFO
//! - **TracingEventSink / InMemoryEventSink**: ライフサイクルイベントの出力先

pub mod event_sinks;
pub mod inmem_queue;

pub use self::event_sinks::{InMemoryEventSink, TracingEventSink};
pub use self::inmem_queue::InMemoryWorkQueue;
