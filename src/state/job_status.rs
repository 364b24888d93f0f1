/// Job status definitions for tracking crawl job lifecycle
///
/// A job moves `Queued -> Running -> {Completed, Error}`. The two terminal
/// states have no outgoing transitions.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents the lifecycle status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job has been created and waits to be triggered
    Queued,

    /// Job has been accepted into a batch and is being processed
    Running,

    /// Page was fetched and analyzed
    Completed,

    /// Page fetch failed
    Error,
}

impl JobStatus {
    /// Returns true if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns true if moving from `self` to `next` keeps the status monotonic
    ///
    /// Re-asserting the current non-terminal status is allowed so that marking
    /// an already running job as running is a no-op.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Queued => matches!(next, Self::Queued | Self::Running),
            Self::Running => matches!(next, Self::Running | Self::Completed | Self::Error),
            Self::Completed | Self::Error => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns all statuses in lifecycle order
    pub fn all() -> [Self; 4] {
        [Self::Queued, Self::Running, Self::Completed, Self::Error]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}
