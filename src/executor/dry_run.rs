//! Executor that records commands instead of running them

use super::shell::{ExecutionResult, ShellBackend};
use super::traits::{CommandExecutor, CommandRequest};
use crate::pipeline::PipelineError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// A command as it would have been issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Command line as issued
    pub command: String,
    /// Working directory, if not the workspace
    pub cwd: Option<PathBuf>,
}

/// Records every request and answers with exit code 0 and empty output
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    backend: ShellBackend,
    commands: Mutex<Vec<RecordedCommand>>,
}

impl DryRunExecutor {
    /// Creates a recorder rendering commands for `backend`
    #[must_use]
    pub fn new(backend: ShellBackend) -> Self {
        Self {
            backend,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Removes and returns the recorded commands
    pub fn take(&self) -> Vec<RecordedCommand> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl CommandExecutor for DryRunExecutor {
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
        tracing::debug!(command = %request.command, "Would execute command");
        self.commands.lock().push(RecordedCommand {
            command: request.command.to_string(),
            cwd: request.cwd.map(Path::to_path_buf),
        });
        Ok(ExecutionResult::default())
    }

    fn backend(&self) -> ShellBackend {
        self.backend
    }
}
