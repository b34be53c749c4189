//! Error types for the orchestration core.
//!
//! Task-level variants (`TaskTimeout`, `TaskException`, `TaskCancelled`,
//! `MissingResult`) never escape a run: the dispatcher and synthesizer turn
//! them into degraded results. `SynthesisFailure` is the only variant that
//! aborts a run.

use crate::models::TaskStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A task exceeded its time budget.
    #[error("Timeout")]
    TaskTimeout { after: Duration },

    /// A task's invocation returned an error or panicked.
    #[error("{0}")]
    TaskException(String),

    /// The whole run was cancelled before the task settled.
    #[error("Cancelled")]
    TaskCancelled,

    /// A weighted capability has no entry in the results map.
    #[error("No result for capability: {0}")]
    MissingResult(String),

    /// Aggregation itself failed. Fatal to the run.
    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),

    /// The external renderer failed. The bundle is still returned.
    #[error("Report rendering failed: {0}")]
    RendererFailure(String),

    /// A background run died before producing a bundle.
    #[error("Run aborted: {0}")]
    RunAborted(String),

    #[error("Invalid status transition for {task}: {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Invalid weight table: {0}")]
    InvalidWeights(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let timeout = Error::TaskTimeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.to_string(), "Timeout");
        assert_eq!(Error::TaskCancelled.to_string(), "Cancelled");
        assert_eq!(
            Error::TaskException("boom".to_string()).to_string(),
            "boom"
        );
        assert_eq!(
            Error::InvalidTransition {
                task: "patent_analysis".to_string(),
                from: TaskStatus::Complete,
                to: TaskStatus::Running,
            }
            .to_string(),
            "Invalid status transition for patent_analysis: Complete -> Running"
        );
    }
}
