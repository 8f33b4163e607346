//! Ports - 抽象化レイヤー
//!
//! core が外部に依存する境界を trait として定義します。
//! - 時刻（Clock）と ID 生成（IdGenerator）: テストで差し替え可能にする
//! - WorkQueue: dispatcher と pump loop をつなぐ FIFO
//! - EventSink: 永続化などの外部ストアへのイベント配送

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod work_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::work_queue::{WorkItem, WorkQueue};
