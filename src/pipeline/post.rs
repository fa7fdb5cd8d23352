//! Post-condition types for pipeline execution
//!
//! The post block of a pipeline is its teardown hook: every condition is
//! considered once after the last stage attempt, whatever the result.

#![allow(clippy::must_use_candidate)]

use super::steps::Step;
use super::types::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conditions that execute after pipeline completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostCondition {
    /// Always execute regardless of result
    Always {
        /// Steps to execute
        steps: Vec<Step>,
    },

    /// Execute only on success
    Success {
        /// Steps to execute
        steps: Vec<Step>,
    },

    /// Execute only on failure
    Failure {
        /// Steps to execute
        steps: Vec<Step>,
    },
}

impl PostCondition {
    /// Creates an "always" condition
    pub fn always(steps: Vec<Step>) -> Self {
        Self::Always { steps }
    }

    /// Creates a "success" condition
    pub fn success(steps: Vec<Step>) -> Self {
        Self::Success { steps }
    }

    /// Creates a "failure" condition
    pub fn failure(steps: Vec<Step>) -> Self {
        Self::Failure { steps }
    }

    /// Returns the steps for this condition
    pub fn steps(&self) -> &[Step] {
        match self {
            Self::Always { steps } | Self::Success { steps } | Self::Failure { steps } => steps,
        }
    }

    /// Returns true if this condition should execute given the result
    pub fn should_execute(&self, status: RunStatus) -> bool {
        match self {
            Self::Always { .. } => true,
            Self::Success { .. } => status == RunStatus::Success,
            Self::Failure { .. } => status == RunStatus::Failure,
        }
    }
}

impl fmt::Display for PostCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always { steps } => write!(f, "always({} steps)", steps.len()),
            Self::Success { steps } => write!(f, "success({} steps)", steps.len()),
            Self::Failure { steps } => write!(f, "failure({} steps)", steps.len()),
        }
    }
}
