//! Domain model (ids, kinds, task entity, state machine, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod kind;
pub mod state;
pub mod task;

pub use self::errors::{
    ConfigError, ExecutionError, PoolError, RoutingError, TransitionError,
};
pub use self::events::TaskEvent;
pub use self::ids::{Id, IdMarker, TaskId};
pub use self::kind::TaskKind;
pub use self::state::TaskStatus;
pub use self::task::Task;
