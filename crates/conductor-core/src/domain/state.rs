//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Failed (worker cannot handle the task's kind)
///
/// Completed と Failed は終端。どの状態にも戻らない（リトライなし）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created and enqueued, not yet picked up.
    Pending,

    /// Currently being executed by a worker.
    Running,

    /// Successfully completed.
    Completed,

    /// Failed (capability mismatch or execution failure).
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Is the task still waiting on, or inside, a worker?
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::start(TaskStatus::Pending, TaskStatus::Running)]
    #[case::reject(TaskStatus::Pending, TaskStatus::Failed)]
    #[case::complete(TaskStatus::Running, TaskStatus::Completed)]
    #[case::fail(TaskStatus::Running, TaskStatus::Failed)]
    fn allowed_transitions(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::skip_running(TaskStatus::Pending, TaskStatus::Completed)]
    #[case::back_to_pending(TaskStatus::Running, TaskStatus::Pending)]
    #[case::rerun(TaskStatus::Running, TaskStatus::Running)]
    #[case::completed_is_final(TaskStatus::Completed, TaskStatus::Failed)]
    #[case::failed_is_final(TaskStatus::Failed, TaskStatus::Running)]
    #[case::no_retry(TaskStatus::Failed, TaskStatus::Pending)]
    fn rejected_transitions(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert_eq!(TaskStatus::Running.to_string(), "running");
    }
}
