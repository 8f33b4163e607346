//! Dispatcher configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// Runtime knobs for the dispatcher and workflow runner.
///
/// Every field has a default, so `{}` is a valid config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of pump loops started by `Dispatcher::start`.
    pub pool_size: usize,
    /// How long a pump loop waits on an empty queue before re-checking
    /// the running flag.
    pub poll_interval_ms: u64,
    /// Sleep between workflow status polls.
    pub workflow_poll_interval_ms: u64,
    /// Give up waiting on a single workflow step after this long.
    /// `None` waits indefinitely.
    pub workflow_max_wait_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            poll_interval_ms: 1_000,
            workflow_poll_interval_ms: 100,
            workflow_max_wait_ms: None,
        }
    }
}

impl DispatcherConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn workflow_poll_interval(&self) -> Duration {
        Duration::from_millis(self.workflow_poll_interval_ms)
    }

    pub fn workflow_max_wait(&self) -> Option<Duration> {
        self.workflow_max_wait_ms.map(Duration::from_millis)
    }
}
