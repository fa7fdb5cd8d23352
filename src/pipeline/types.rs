//! Core types for pipeline domain
//!
//! Outcomes of stages and runs, the run state machine, and the
//! [`Validate`] trait shared by definition types.

#![allow(clippy::must_use_candidate)]

use super::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a stage failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Human readable message
    pub message: String,

    /// Exit code of the triggering command, if a command triggered it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Captured output of the triggering command
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub output: String,
}

impl FailureReason {
    /// Creates a reason with only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
            output: String::new(),
        }
    }
}

impl From<&PipelineError> for FailureReason {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::CommandFailed { code, output, .. } => Self {
                message: err.to_string(),
                exit_code: Some(*code),
                output: output.clone(),
            },
            other => Self::message(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Stage body completed
    Success,
    /// Stage body failed
    Failure {
        /// Failure details
        reason: FailureReason,
    },
    /// Stage was not activated
    Skipped {
        /// Why the stage did not run
        reason: String,
    },
}

impl Outcome {
    /// Creates a failure outcome from an error
    pub fn failure(err: &PipelineError) -> Self {
        Self::Failure {
            reason: FailureReason::from(err),
        }
    }

    /// Creates a skipped outcome
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Returns true if the stage succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the stage failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Returns true if the stage was skipped
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure { .. } => write!(f, "FAILURE"),
            Self::Skipped { .. } => write!(f, "SKIPPED"),
        }
    }
}

/// Overall status of a run. There is no partial or warning status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every non-skipped, non-ignore-failure stage succeeded
    Success,
    /// Something failed
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing has happened yet
    NotStarted,
    /// Stages are executing
    Running,
    /// The teardown hook is executing
    Teardown,
    /// The run has finished with the given status
    Completed(RunStatus),
}

impl RunState {
    /// Returns true if `next` is a legal successor of this state
    #[must_use]
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Running)
                | (Self::NotStarted | Self::Running, Self::Teardown)
                | (Self::Teardown, Self::Completed(_))
        )
    }
}

/// Outcome of one stage as recorded in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name
    pub name: String,
    /// What happened
    pub outcome: Outcome,
    /// Whether the stage was marked ignore-failure
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub ignore_failure: bool,
    /// Wall clock time spent in the stage
    pub duration_ms: u128,
}

/// The first failure that decided the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Failing stage, `None` when the run failed before any stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Why it failed
    pub reason: FailureReason,
}

/// What the teardown hook did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Number of times teardown ran (always 1 after a completed run)
    pub runs: u32,
    /// Failures logged during teardown
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

/// Aggregated result of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Run identifier
    pub run_id: String,
    /// Overall status
    pub status: RunStatus,
    /// Stages in execution order (stages after a halt are absent)
    pub stages: Vec<StageReport>,
    /// First failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    /// Teardown summary
    pub teardown: TeardownReport,
    /// Total wall clock time
    pub duration_ms: u128,
}

impl PipelineOutcome {
    /// Returns true if the run succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Looks up the report of a stage by name
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Names of the stages that were attempted (not skipped)
    #[must_use]
    pub fn executed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| !s.outcome.is_skipped())
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
