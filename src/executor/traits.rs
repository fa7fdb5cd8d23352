//! Command execution traits
//!
//! Stages talk to the outside world only through [`CommandExecutor`].

use super::shell::{ExecutionResult, ShellBackend};
use crate::pipeline::{Environment, PipelineError};
use std::path::Path;
use std::sync::Arc;

/// One command invocation
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    /// Rendered command line, passed to the interpreter verbatim
    pub command: &'a str,

    /// Working directory; relative paths are resolved against the workspace
    pub cwd: Option<&'a Path>,

    /// Variables exported to the command
    pub env: &'a Environment,

    /// Text written to stdin
    pub stdin: Option<&'a str>,

    /// Capture output without echoing it
    pub quiet: bool,
}

impl<'a> CommandRequest<'a> {
    /// Creates a request that runs `command` in the workspace
    #[must_use]
    pub fn new(command: &'a str, env: &'a Environment) -> Self {
        Self {
            command,
            cwd: None,
            env,
            stdin: None,
            quiet: false,
        }
    }

    /// Runs in `cwd`
    #[must_use]
    pub fn in_dir(mut self, cwd: Option<&'a Path>) -> Self {
        self.cwd = cwd;
        self
    }

    /// Feeds `stdin` to the command
    #[must_use]
    pub fn with_stdin(mut self, stdin: Option<&'a str>) -> Self {
        self.stdin = stdin;
        self
    }

    /// Suppresses output echo
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Runs command lines and reports their exit code and output
pub trait CommandExecutor: Send + Sync {
    /// Runs one command.
    ///
    /// # Errors
    ///
    /// Only when the command could not be started at all. A non-zero exit
    /// code is reported in the [`ExecutionResult`].
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError>;

    /// Backend commands are interpreted by
    fn backend(&self) -> ShellBackend;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
        (**self).run(request)
    }

    fn backend(&self) -> ShellBackend {
        (**self).backend()
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Arc<E> {
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
        (**self).run(request)
    }

    fn backend(&self) -> ShellBackend {
        (**self).backend()
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Box<E> {
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
        (**self).run(request)
    }

    fn backend(&self) -> ShellBackend {
        (**self).backend()
    }
}
