use super::shell::{ExecutionResult, ShellBackend, ShellCommand, ShellConfig};
use super::traits::{CommandExecutor, CommandRequest};
use crate::pipeline::PipelineError;
use std::collections::HashMap;
use std::path::PathBuf;

/// Local executor that runs commands on the host system
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    /// Configuration for executor
    config: ExecutorConfig,
}

/// Configuration for local executor
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Workspace root; relative working directories are resolved against it
    pub workspace: PathBuf,

    /// Environment variables exported to every command
    pub env: HashMap<String, String>,

    /// Interpreter backend
    pub backend: ShellBackend,

    /// Echo command output while it runs
    pub streaming: bool,
}

impl LocalExecutor {
    /// Creates a new local executor using the host's native backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the workspace root
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.workspace = cwd.into();
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Overrides the detected backend
    #[must_use]
    pub fn with_backend(mut self, backend: ShellBackend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Echoes command output while it runs
    #[must_use]
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.config.streaming = streaming;
        self
    }

    /// Returns the executor configuration
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl CommandExecutor for LocalExecutor {
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
        let cwd = match request.cwd {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.config.workspace.join(dir),
            None => self.config.workspace.clone(),
        };

        let mut env = self.config.env.clone();
        env.extend(
            request
                .env
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let shell_config = ShellConfig {
            cwd,
            env,
            backend: self.config.backend,
            streaming: self.config.streaming && !request.quiet,
        };

        let mut command = ShellCommand::new(&shell_config);
        if let Some(input) = request.stdin {
            command = command.stdin(input);
        }
        command.execute(request.command)
    }

    fn backend(&self) -> ShellBackend {
        self.config.backend
    }
}
