//! Run lifecycle and result types

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a single archive run
///
/// `Start → Fetching → Reading → (Transforming → Writing)* → Committing → Completed`,
/// with `Errored` reachable from every non-terminal stage. Reading the next
/// chunk re-enters `Reading` while the previous chunk's write is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Fetching,
    Reading,
    Transforming,
    Writing,
    Committing,
    Completed,
    Errored,
}

impl Stage {
    /// Whether the run has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Errored)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::{Committing, Completed, Errored, Fetching, Reading, Start, Transforming, Writing};
        match (self, next) {
            (from, Errored) => !from.is_terminal(),
            (Start, Fetching)
            | (Fetching, Reading)
            | (Reading, Transforming)
            | (Transforming, Writing)
            | (Writing, Reading)
            | (Reading, Writing)
            | (Reading | Writing, Committing)
            | (Committing, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Fetching => "fetching",
            Stage::Reading => "reading",
            Stage::Transforming => "transforming",
            Stage::Writing => "writing",
            Stage::Committing => "committing",
            Stage::Completed => "completed",
            Stage::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stage the run was in when it failed
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl RunFailure {
    pub fn new(stage: Stage, error: &Error) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one archive run, returned to the invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub last_run_src_file_name: String,
    /// URI prefix of the written objects, absent when the key was invalid
    pub last_run_tgt_file_pattern: Option<String>,
    pub status_code: u16,
    /// Records written
    #[serde(default)]
    pub records: usize,
    /// URIs of the objects written, in chunk order
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
}

impl RunResult {
    /// Whether the run completed
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Number of objects written
    pub fn objects_written(&self) -> usize {
        self.objects.len()
    }
}
