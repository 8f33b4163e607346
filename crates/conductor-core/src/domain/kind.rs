use serde::{Deserialize, Serialize};
use std::fmt;

/// String tag identifying a unit-of-work type (e.g. `"blog_post"`).
///
/// Workers declare the kinds they can execute as capabilities; routing
/// matches a task's kind against those sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TaskKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
