mod jobs;
mod processor;

pub use jobs::{JobRecord, JobRegistry, JobStatus};
pub use processor::SegmentProcessor;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-open cut `[start, end)` in seconds on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid trim range: start {start} must be before end {end}")]
    InvalidRange {
        start: f64,
        end: f64,
    },

    #[error("Media tool exited with code {code:?}: {stderr}")]
    Tool {
        code: Option<i32>,
        stderr: String,
    },
}

pub type Result<T, E = SegmentError> = std::result::Result<T, E>;
