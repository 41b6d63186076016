//! Repository events delivered by the hosting platform.

use serde::{Deserialize, Serialize};

/// Kind of repository event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch.
    Push,

    /// A pull request opened against or updated on a target branch.
    PullRequest,
}

impl EventKind {
    /// Get the event kind as a string.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A repository event.
///
/// Immutable once constructed; produced externally by the hosting
/// platform and evaluated against the workflow triggers at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,

    /// Target branch of the push or pull request.
    pub branch: String,

    /// Paths changed by the event, relative to the repository root.
    /// May be empty (e.g. an empty commit).
    pub changed_paths: Vec<String>,
}

impl Event {
    /// Create a new event.
    pub fn new<B, P, S>(kind: EventKind, branch: B, changed_paths: P) -> Self
    where
        B: Into<String>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            branch: branch.into(),
            changed_paths: changed_paths.into_iter().map(Into::into).collect(),
        }
    }
}
