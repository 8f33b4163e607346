//! Task entity: one unit of submitted work and its outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::TransitionError;
use super::ids::TaskId;
use super::kind::TaskKind;
use super::state::TaskStatus;

/// A unit of work plus its outcome.
///
/// Design:
/// - `id`, `kind`, `payload`, `created_at` never change after creation.
/// - All status changes go through the `mark_*` / `reject` methods, which
///   enforce the state machine in `TaskStatus::can_transition_to`.
/// - `result` is only set on `Completed`, `error` only on `Failed`.
///
/// Serialize-only. A task is written out as a JSON record, never rebuilt
/// from one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    payload: serde_json::Value,
    status: TaskStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            payload,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending -> Running.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Running -> Completed.
    pub fn mark_completed(
        &mut self,
        now: DateTime<Utc>,
        result: serde_json::Value,
    ) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Completed)?;
        self.completed_at = Some(now);
        self.result = Some(result);
        Ok(())
    }

    /// Running -> Failed.
    pub fn mark_failed(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Running {
            return Err(TransitionError {
                from: self.status,
                to: TaskStatus::Failed,
            });
        }
        self.transition(TaskStatus::Failed)?;
        self.completed_at = Some(now);
        self.error = Some(error.into());
        Ok(())
    }

    /// Pending -> Failed without ever running (capability mismatch).
    ///
    /// `started_at` stays unset; `completed_at` is set so that every
    /// terminal task carries a completion time.
    pub fn reject(
        &mut self,
        now: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.status != TaskStatus::Pending {
            return Err(TransitionError {
                from: self.status,
                to: TaskStatus::Failed,
            });
        }
        self.transition(TaskStatus::Failed)?;
        self.completed_at = Some(now);
        self.error = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
