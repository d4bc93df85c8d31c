//! Workload status tags.
//!
//! A workload moves through `InProgress` into exactly one of the terminal
//! states `Completed` or `Failed`. Each reached state is persisted as a
//! distinct zero-content marker object; markers are never deleted or
//! overwritten. The current status of a workload is the highest-ranked
//! marker present.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of an asynchronous workload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A worker has picked up the request and is processing it.
    InProgress,

    /// The request failed terminally; no result object exists.
    Failed,

    /// The request completed; a result object exists.
    Completed,
}

impl Status {
    /// Rank used by readers to resolve the current status from the set of
    /// markers present. A retry that ultimately succeeds leaves both a
    /// `Failed` and a `Completed` marker behind; ranking `Completed`
    /// highest makes the successful outcome win.
    pub fn rank(&self) -> u8 {
        match self {
            Status::InProgress => 1,
            Status::Failed => 2,
            Status::Completed => 3,
        }
    }

    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// The name used in storage keys (`status/{name}`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::InProgress => "in_progress",
            Status::Failed => "failed",
            Status::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a status name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown workload status: '{0}'")]
pub struct StatusParseError(pub String);

impl FromStr for Status {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Status::InProgress),
            "failed" => Ok(Status::Failed),
            "completed" => Ok(Status::Completed),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Resolve the current status from the set of markers present.
///
/// Returns `None` when no marker has been written yet (the implicit
/// `Received` state).
pub fn current_status(present: &[Status]) -> Option<Status> {
    present.iter().copied().max_by_key(Status::rank)
}
