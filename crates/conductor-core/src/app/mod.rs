//! App - アプリケーション層
//!
//! Worker と ports を組み合わせて dispatcher を構成します。
//!
//! # 主要コンポーネント
//! - **DispatcherBuilder**: 構築と起動時検証
//! - **Dispatcher**: 振り分け・キューイング・pump pool・ステータス集計
//! - **PumpPool**: キューを消費するループ群
//! - **WorkflowRunner**: ステップの逐次実行
//! - **StatusSnapshot**: 集計結果

pub mod builder;
pub mod dispatcher;
pub(crate) mod pump_loop;
pub mod registry;
pub mod status;
pub mod workflow;

pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::dispatcher::Dispatcher;
pub use self::registry::WorkerRegistry;
pub use self::status::{StatusSnapshot, WorkerStatus};
pub use self::workflow::{WorkflowRunner, WorkflowStep};
