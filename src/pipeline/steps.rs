//! Step types for pipeline execution
//!
//! This module defines step types that represent atomic units of work.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Validate;
use super::errors::ValidationError;
use super::stage::WhenCondition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A readiness signal polled by [`StepType::Poll`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Trimmed stdout of `command` must equal `expected`
    OutputEquals {
        /// Command to run
        command: String,
        /// Expected output, e.g. `healthy`
        expected: String,
    },

    /// The HTTP status code of `url` must equal `expected`
    HttpStatus {
        /// URL to request
        url: String,
        /// Expected status code
        expected: u16,
    },
}

impl Probe {
    /// Creates an output equality probe
    pub fn output_equals(command: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::OutputEquals {
            command: command.into(),
            expected: expected.into(),
        }
    }

    /// Creates an HTTP probe that expects `200`
    pub fn http_ok(url: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            expected: 200,
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputEquals { command, expected } => write!(f, "`{command}` == {expected}"),
            Self::HttpStatus { url, expected } => write!(f, "HTTP {expected} from {url}"),
        }
    }
}

/// Types of steps available in pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepType {
    /// Shell command execution
    Shell {
        /// Command to execute
        command: String,
        /// Working directory relative to the workspace
        #[serde(skip_serializing_if = "Option::is_none", default)]
        dir: Option<String>,
        /// Text written to the command's stdin
        #[serde(skip_serializing_if = "Option::is_none", default)]
        stdin: Option<String>,
        /// A non-zero exit is logged and otherwise ignored
        #[serde(default)]
        ignore_failure: bool,
    },

    /// Echo message
    Echo {
        /// Message to output
        message: String,
    },

    /// Runs exactly one of two step lists
    Branch {
        /// Condition choosing the side
        condition: WhenCondition,
        /// Steps run when the condition holds
        then: Vec<Step>,
        /// Steps run otherwise
        #[serde(default)]
        otherwise: Vec<Step>,
    },

    /// Polls a readiness probe with a fixed delay
    Poll {
        /// Signal to poll
        probe: Probe,
        /// Maximum number of probe invocations
        attempts: u32,
        /// Delay between attempts
        delay: Duration,
    },

    /// Archives files matching a glob
    Archive {
        /// Glob relative to the workspace
        pattern: String,
        /// Succeed when nothing matches
        #[serde(default)]
        allow_empty: bool,
    },
}

impl StepType {
    /// Creates a shell command step
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell {
            command: command.into(),
            dir: None,
            stdin: None,
            ignore_failure: false,
        }
    }

    /// Creates an echo step
    pub fn echo(message: impl Into<String>) -> Self {
        Self::Echo {
            message: message.into(),
        }
    }

    /// Creates a branch step
    pub fn branch(condition: WhenCondition, then: Vec<Step>, otherwise: Vec<Step>) -> Self {
        Self::Branch {
            condition,
            then,
            otherwise,
        }
    }

    /// Creates a poll step
    pub fn poll(probe: Probe, attempts: u32, delay: Duration) -> Self {
        Self::Poll {
            probe,
            attempts,
            delay,
        }
    }

    /// Creates an archive step
    pub fn archive(pattern: impl Into<String>, allow_empty: bool) -> Self {
        Self::Archive {
            pattern: pattern.into(),
            allow_empty,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell { command, .. } => write!(f, "sh({command})"),
            Self::Echo { message } => write!(f, "echo({message})"),
            Self::Branch { condition, .. } => write!(f, "if({condition})"),
            Self::Poll {
                probe, attempts, ..
            } => write!(f, "poll({probe}, {attempts}x)"),
            Self::Archive { pattern, .. } => write!(f, "archive({pattern})"),
        }
    }
}

impl Validate for StepType {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        match self {
            Self::Shell { command, .. } if command.trim().is_empty() => {
                Err(ValidationError::EmptyField("Shell command"))
            }
            Self::Branch {
                condition,
                then,
                otherwise,
            } => {
                condition.validate()?;
                then.iter()
                    .chain(otherwise.iter())
                    .try_for_each(Validate::validate)
            }
            Self::Poll { attempts: 0, .. } => Err(ValidationError::InvalidAttempts { value: 0 }),
            Self::Poll {
                probe: Probe::OutputEquals { command, .. },
                ..
            } if command.trim().is_empty() => Err(ValidationError::EmptyField("Probe command")),
            Self::Poll {
                probe: Probe::HttpStatus { url, .. },
                ..
            } if url.trim().is_empty() => Err(ValidationError::EmptyField("Probe URL")),
            Self::Archive { pattern, .. } if pattern.trim().is_empty() => {
                Err(ValidationError::EmptyField("Archive pattern"))
            }
            _ => Ok(()),
        }
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Type of step
    #[serde(flatten)]
    pub step_type: StepType,

    /// Optional name for the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Step {
    /// Creates a new step
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            name: None,
        }
    }

    /// Sets the name of the step
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runs a shell step inside `dir`; no effect on other step types
    pub fn in_dir(mut self, path: impl Into<String>) -> Self {
        if let StepType::Shell { dir, .. } = &mut self.step_type {
            *dir = Some(path.into());
        }
        self
    }

    /// Feeds `input` to a shell step's stdin; no effect on other step types
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        if let StepType::Shell { stdin, .. } = &mut self.step_type {
            *stdin = Some(input.into());
        }
        self
    }

    /// Makes a shell step best-effort; no effect on other step types
    pub fn ignoring_failure(mut self) -> Self {
        if let StepType::Shell { ignore_failure, .. } = &mut self.step_type {
            *ignore_failure = true;
        }
        self
    }

    /// Creates a shell command step
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(StepType::shell(command))
    }

    /// Creates an echo step
    pub fn echo(message: impl Into<String>) -> Self {
        Self::new(StepType::echo(message))
    }

    /// Creates a branch step
    pub fn branch(condition: WhenCondition, then: Vec<Step>, otherwise: Vec<Step>) -> Self {
        Self::new(StepType::branch(condition, then, otherwise))
    }

    /// Creates a conditional step with no `otherwise` side
    pub fn when(condition: WhenCondition, then: Vec<Step>) -> Self {
        Self::branch(condition, then, Vec::new())
    }

    /// Creates a poll step
    pub fn poll(probe: Probe, attempts: u32, delay: Duration) -> Self {
        Self::new(StepType::poll(probe, attempts, delay))
    }

    /// Creates an archive step
    pub fn archive(pattern: impl Into<String>, allow_empty: bool) -> Self {
        Self::new(StepType::archive(pattern, allow_empty))
    }
}

impl Validate for Step {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.step_type.validate()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Step({}): {}", name, self.step_type),
            None => write!(f, "Step: {}", self.step_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ConfigFlag;

    #[test]
    fn test_step_type_shell() {
        let step_type = StepType::shell("mvn -B verify");
        assert!(matches!(step_type, StepType::Shell { .. }));
        assert_eq!(step_type.to_string(), "sh(mvn -B verify)");
    }

    #[test]
    fn test_step_modifiers_apply_to_shell() {
        let step = Step::shell("docker login")
            .in_dir("backend")
            .with_stdin("${REGISTRY_PASSWORD}")
            .ignoring_failure();

        match step.step_type {
            StepType::Shell {
                dir,
                stdin,
                ignore_failure,
                ..
            } => {
                assert_eq!(dir.as_deref(), Some("backend"));
                assert_eq!(stdin.as_deref(), Some("${REGISTRY_PASSWORD}"));
                assert!(ignore_failure);
            }
            other => panic!("unexpected step type: {other}"),
        }
    }

    #[test]
    fn test_step_modifiers_ignore_other_types() {
        let step = Step::echo("hi").in_dir("backend").ignoring_failure();
        assert_eq!(step.step_type, StepType::echo("hi"));
    }

    #[test]
    fn test_step_with_name() {
        let step = Step::shell("mvn package").with_name("Package");
        assert_eq!(step.to_string(), "Step(Package): sh(mvn package)");
    }

    #[test]
    fn test_poll_requires_attempts() {
        let step = Step::poll(Probe::http_ok("http://localhost"), 0, Duration::from_secs(1));
        assert_eq!(
            step.validate(),
            Err(ValidationError::InvalidAttempts { value: 0 })
        );
    }

    #[test]
    fn test_branch_validates_nested_steps() {
        let step = Step::branch(
            WhenCondition::flag(ConfigFlag::RunTests),
            vec![Step::shell("mvn verify")],
            vec![Step::shell("   ")],
        );
        assert_eq!(
            step.validate(),
            Err(ValidationError::EmptyField("Shell command"))
        );
    }

    #[test]
    fn test_probe_display() {
        assert_eq!(
            Probe::http_ok("http://localhost:3000/").to_string(),
            "HTTP 200 from http://localhost:3000/"
        );
    }

    #[test]
    fn test_step_deserialize_from_yaml() {
        let yaml = r"
type: shell
command: mvn -B clean verify
dir: backend
";
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step, Step::shell("mvn -B clean verify").in_dir("backend"));
    }
}
