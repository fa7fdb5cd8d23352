//! Stage types for pipeline definition
//!
//! This module defines stages, their activation conditions and their
//! builder pattern.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Validate;
use super::config::PipelineConfig;
use super::errors::ValidationError;
use super::runner::StageContext;
use super::steps::Step;
use super::types::Outcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boolean switches of the resolved configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFlag {
    /// Run the full test suite instead of packaging only
    RunTests,
    /// Leave the stack running after the pipeline
    KeepRunning,
}

/// String fields of the resolved configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    /// Registry endpoint
    Registry,
    /// Credentials reference
    Credentials,
    /// Branch being built
    Branch,
}

impl ConfigField {
    fn value(self, config: &PipelineConfig) -> &str {
        match self {
            Self::Registry => &config.registry,
            Self::Credentials => &config.credentials_id,
            Self::Branch => &config.branch,
        }
    }
}

/// When conditions for stage and step activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WhenCondition {
    /// Always true
    Always,

    /// True when the flag is set
    Flag {
        /// Flag to test
        flag: ConfigFlag,
    },

    /// True when the field is a non-empty string
    NotEmpty {
        /// Field to test
        field: ConfigField,
    },

    /// True when the branch is one of the configured release branches
    ReleaseBranch,

    /// True when the branch matches exactly
    Branch {
        /// Branch name
        branch: String,
    },

    /// Negation
    Not {
        /// Negated condition
        condition: Box<WhenCondition>,
    },

    /// All conditions must be true
    AllOf {
        /// List of conditions
        conditions: Vec<WhenCondition>,
    },

    /// At least one condition must be true
    AnyOf {
        /// List of conditions
        conditions: Vec<WhenCondition>,
    },
}

impl WhenCondition {
    /// Creates a flag condition
    pub fn flag(flag: ConfigFlag) -> Self {
        Self::Flag { flag }
    }

    /// Creates a non-empty field condition
    pub fn not_empty(field: ConfigField) -> Self {
        Self::NotEmpty { field }
    }

    /// Creates a branch condition
    pub fn branch(branch: impl Into<String>) -> Self {
        Self::Branch {
            branch: branch.into(),
        }
    }

    /// Negates a condition
    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: WhenCondition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Creates an all-of condition
    pub fn all_of(conditions: Vec<WhenCondition>) -> Self {
        Self::AllOf { conditions }
    }

    /// Creates an any-of condition
    pub fn any_of(conditions: Vec<WhenCondition>) -> Self {
        Self::AnyOf { conditions }
    }

    /// Evaluates the condition against a resolved configuration
    pub fn evaluate(&self, config: &PipelineConfig) -> bool {
        match self {
            Self::Always => true,
            Self::Flag { flag } => match flag {
                ConfigFlag::RunTests => config.run_tests,
                ConfigFlag::KeepRunning => config.keep_running,
            },
            Self::NotEmpty { field } => !field.value(config).is_empty(),
            Self::ReleaseBranch => {
                !config.branch.is_empty() && config.release_branches.contains(&config.branch)
            }
            Self::Branch { branch } => config.branch == *branch,
            Self::Not { condition } => !condition.evaluate(config),
            Self::AllOf { conditions } => conditions.iter().all(|c| c.evaluate(config)),
            Self::AnyOf { conditions } => conditions.iter().any(|c| c.evaluate(config)),
        }
    }
}

impl fmt::Display for WhenCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Flag { flag } => write!(f, "{flag:?}"),
            Self::NotEmpty { field } => write!(f, "{field:?} is set"),
            Self::ReleaseBranch => write!(f, "release branch"),
            Self::Branch { branch } => write!(f, "branch == {branch}"),
            Self::Not { condition } => write!(f, "not ({condition})"),
            Self::AllOf { conditions } | Self::AnyOf { conditions } => {
                let joiner = if matches!(self, Self::AllOf { .. }) {
                    " and "
                } else {
                    " or "
                };
                let parts: Vec<String> = conditions.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(joiner))
            }
        }
    }
}

impl Validate for WhenCondition {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        match self {
            Self::Branch { branch } if branch.is_empty() => {
                Err(ValidationError::EmptyField("Branch"))
            }
            Self::Not { condition } => condition.validate(),
            Self::AllOf { conditions } | Self::AnyOf { conditions } => {
                conditions.iter().try_for_each(Validate::validate)
            }
            _ => Ok(()),
        }
    }
}

/// A stage in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name
    pub name: String,

    /// Steps in this stage
    pub steps: Vec<Step>,

    /// Optional when condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenCondition>,

    /// A failure of this stage is recorded but does not halt the run
    #[serde(default)]
    pub ignore_failure: bool,
}

impl Validate for Stage {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if self.name.len() > 100 {
            return Err(ValidationError::NameTooLong {
                max: 100,
                len: self.name.len(),
            });
        }

        if self.steps.is_empty() {
            return Err(ValidationError::EmptyStage {
                stage: self.name.clone(),
            });
        }

        if let Some(ref when) = self.when {
            when.validate()?;
        }

        self.steps.iter().try_for_each(Validate::validate)
    }
}

impl Stage {
    /// Creates a new stage
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            when: None,
            ignore_failure: false,
        }
    }

    /// Sets when condition for this stage
    pub fn with_when(mut self, when: WhenCondition) -> Self {
        self.when = Some(when);
        self
    }

    /// Marks the stage as best-effort
    pub fn ignoring_failure(mut self) -> Self {
        self.ignore_failure = true;
        self
    }

    /// Returns true if the stage should run under `config`
    pub fn activate(&self, config: &PipelineConfig) -> bool {
        self.when.as_ref().is_none_or(|when| when.evaluate(config))
    }

    /// Runs the stage body, yielding `Skipped` without touching the
    /// executor when the stage is not active.
    pub fn run(&self, ctx: &StageContext<'_>) -> Outcome {
        if let Some(config) = ctx.config() {
            if !self.activate(config) {
                return Outcome::skipped(self.skip_reason());
            }
        }

        match ctx.execute_steps(&self.steps) {
            Ok(()) => Outcome::Success,
            Err(err) => Outcome::failure(&err),
        }
    }

    pub(crate) fn skip_reason(&self) -> String {
        match &self.when {
            Some(when) => format!("condition not met: {when}"),
            None => "condition not met".to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage({}): {} steps", self.name, self.steps.len())
    }
}

/// Builder for creating stages
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    /// Creates a new stage builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stage: Stage::new(name, Vec::new()),
        }
    }

    /// Sets when condition for the stage
    pub fn when(mut self, when: WhenCondition) -> Self {
        self.stage.when = Some(when);
        self
    }

    /// Marks the stage as best-effort
    pub fn ignore_failure(mut self) -> Self {
        self.stage.ignore_failure = true;
        self
    }

    /// Adds a step to the stage
    pub fn step(mut self, step: Step) -> Self {
        self.stage.steps.push(step);
        self
    }

    /// Adds multiple steps to the stage
    pub fn steps(mut self, mut steps: Vec<Step>) -> Self {
        self.stage.steps.append(&mut steps);
        self
    }

    /// Builds the stage
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Stage, ValidationError> {
        self.stage.validate()?;
        Ok(self.stage)
    }

    /// Builds the stage without validation
    #[must_use]
    pub fn build_unchecked(self) -> Stage {
        self.stage
    }
}
