//! Pipeline domain types and logic

pub mod cancel;
pub mod config;
pub mod errors;
pub mod pipeline_def;
pub mod poll;
pub mod post;
pub mod runner;
pub mod stage;
pub mod steps;
pub mod types;
pub mod webapp;

pub use serde::{Deserialize, Serialize};

pub use cancel::CancelToken;
pub use config::{
    PipelineConfig, ReadinessConfig, RegistryCredentials, StackLayout, resolve,
    DEFAULT_READINESS_TIMEOUT,
};
pub use errors::{PipelineError, ValidationError};
pub use pipeline_def::{Pipeline, PipelineBuilder};
pub use poll::{Sleeper, ThreadSleeper, poll_until, poll_until_with};
pub use post::PostCondition;
pub use runner::{DEFAULT_ARTIFACT_ROOT, PipelineRunner, PlannedStage, RunPlan, StageContext};
pub use stage::{ConfigField, ConfigFlag, Stage, StageBuilder, WhenCondition};
pub use steps::{Probe, Step, StepType};
pub use types::{
    FailureReason, Outcome, PipelineOutcome, RunFailure, RunState, RunStatus, StageReport,
    TeardownReport, Validate,
};

use crate::executor::expand_variables;
use std::collections::HashMap;

/// Variables available to pipeline steps.
///
/// Values are substituted into commands with `${VAR}` syntax by
/// [`resolve`][Environment::resolve] and are also exported to the
/// environment of every command the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Environment {
    /// Environment variables as key-value pairs.
    #[serde(flatten)]
    pub vars: HashMap<String, String>,
}

impl Environment {
    /// Creates a new empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Gets an environment variable by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.vars.get(key)
    }

    /// Returns a copy of this environment with `other` layered on top.
    #[must_use]
    pub fn merged(&self, other: &Environment) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars }
    }

    /// Resolves a value that may contain variable expansions like `${VAR}`.
    ///
    /// Unknown variables are left untouched.
    #[must_use]
    pub fn resolve(&self, value: &str) -> String {
        expand_variables(value, &self.vars)
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
