//! Error types for pipeline domain

use thiserror::Error;

/// Errors that can occur during pipeline operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Validation failed with specified reason
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Run-time configuration could not be resolved
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Command execution failed
    #[error("Command `{command}` failed with exit code {code}: {output}")]
    CommandFailed {
        /// Command line after variable expansion.
        command: String,
        /// Exit code returned by the command.
        code: i32,
        /// Captured output of the command (stderr, or stdout when stderr is empty).
        output: String,
    },

    /// A readiness probe never succeeded
    #[error("Readiness check '{probe}' not satisfied after {attempts} attempts")]
    RetryExhausted {
        /// Description of the probe.
        probe: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The run was cancelled by the operator
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Artifact archiving failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl PipelineError {
    /// Exit code of the command that triggered this error, if any
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Validation errors for pipeline components
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name cannot be empty
    #[error("Name cannot be empty")]
    EmptyName,

    /// Name too long
    #[error("Name too long: max {max} characters, got {len}")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length of the name.
        len: usize,
    },

    /// Two stages share a name
    #[error("Duplicate stage name: '{name}'")]
    DuplicateStage {
        /// The repeated name.
        name: String,
    },

    /// Pipeline must have at least one stage
    #[error("Pipeline must have at least one stage")]
    EmptyPipeline,

    /// Stage must have at least one step
    #[error("Stage '{stage}' must have at least one step")]
    EmptyStage {
        /// Name of the empty stage.
        stage: String,
    },

    /// Invalid poll attempt count
    #[error("Invalid attempt count: must be positive, got {value}")]
    InvalidAttempts {
        /// The invalid attempt count.
        value: u32,
    },

    /// A step field that must not be empty was empty
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
}
