//! Shell execution module
//!
//! Runs command lines through one of two OS-specific backends:
//!
//! - [`ShellBackend::Posix`]: `sh -c <command>`
//! - [`ShellBackend::PowerShell`]: `powershell -NoProfile -NonInteractive -Command <command>`
//!
//! The backend is chosen once with [`ShellBackend::detect`] and never
//! consulted by stages. A non-zero exit code is part of the
//! [`ExecutionResult`]; only a failure to start the shell is an error.
//!
//! ## Variable Expansion
//!
//! Variables are expanded using the `${VAR_NAME}` syntax:
//!
//! ```rust
//! use std::collections::HashMap;
//! use stackci::expand_variables;
//!
//! let env = HashMap::from([("IMAGE_TAG".to_string(), "42-abcdef1".to_string())]);
//! let expanded = expand_variables("docker build -t app:${IMAGE_TAG} .", &env);
//! assert_eq!(expanded, "docker build -t app:42-abcdef1 .");
//! ```

use crate::pipeline::PipelineError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// OS-specific command interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellBackend {
    /// POSIX `sh`
    Posix,
    /// Windows PowerShell
    PowerShell,
}

impl ShellBackend {
    /// Backend native to the host platform
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }

    /// Interpreter executable
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Posix => "sh",
            Self::PowerShell => "powershell",
        }
    }

    /// Arguments placed before the command line
    #[must_use]
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Self::Posix => &["-c"],
            Self::PowerShell => &["-NoProfile", "-NonInteractive", "-Command"],
        }
    }

    /// Command line that prints only the HTTP status code returned by `url`
    #[must_use]
    pub fn http_status_command(self, url: &str) -> String {
        match self {
            Self::Posix => format!(
                "curl -s -o /dev/null -w '%{{http_code}}' {}",
                shell_words::quote(url)
            ),
            Self::PowerShell => format!(
                "try {{ (Invoke-WebRequest -UseBasicParsing -Uri '{}').StatusCode }} \
                 catch {{ if ($_.Exception.Response) {{ [int]$_.Exception.Response.StatusCode }} else {{ 0 }} }}",
                url.replace('\'', "''")
            ),
        }
    }
}

impl Default for ShellBackend {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Display for ShellBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix => write!(f, "posix"),
            Self::PowerShell => write!(f, "powershell"),
        }
    }
}

impl FromStr for ShellBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "posix" | "sh" => Ok(Self::Posix),
            "powershell" | "pwsh" | "windows" => Ok(Self::PowerShell),
            other => Err(format!("unknown shell backend '{other}'")),
        }
    }
}

/// Shell execution configuration
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Working directory
    pub cwd: PathBuf,

    /// Environment variables, used for expansion and exported to the command
    pub env: HashMap<String, String>,

    /// Interpreter backend
    pub backend: ShellBackend,

    /// Echo output line by line while the command runs
    pub streaming: bool,
}

/// Result of shell command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code, `-1` when the process was killed by a signal
    pub exit_code: i32,

    /// Duration of execution
    pub duration: Duration,
}

impl ExecutionResult {
    /// Returns true if command succeeded (exit code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns true if command failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.exit_code != 0
    }

    /// Output worth showing for a failure: stderr, or stdout when stderr is empty
    #[must_use]
    pub fn diagnostic_output(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Builder for shell commands
#[derive(Debug, Clone)]
pub struct ShellCommand<'a> {
    config: &'a ShellConfig,
    env_override: HashMap<String, String>,
    stdin: Option<String>,
}

impl<'a> ShellCommand<'a> {
    /// Creates a new shell command builder
    #[must_use]
    pub fn new(config: &'a ShellConfig) -> Self {
        Self {
            config,
            env_override: HashMap::new(),
            stdin: None,
        }
    }

    /// Adds environment variables for this command only
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_override.insert(key.into(), value.into());
        self
    }

    /// Writes `input` to the command's stdin
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Executes a shell command. The command line is passed to the
    /// interpreter verbatim; `${VAR}` placeholders must already be rendered.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the interpreter cannot be started.
    /// A non-zero exit code is not an error.
    pub fn execute(&self, command: &str) -> Result<ExecutionResult, PipelineError> {
        let env: HashMap<String, String> = self
            .config
            .env
            .iter()
            .chain(self.env_override.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let start = Instant::now();

        tracing::debug!(
            command = %command,
            backend = %self.config.backend,
            cwd = %self.config.cwd.display(),
            "Executing shell command"
        );

        let mut result = if self.config.streaming {
            self.execute_streaming(command, &env)?
        } else {
            self.execute_captured(command, &env)?
        };
        result.duration = start.elapsed();

        tracing::debug!(
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis(),
            "Shell command finished"
        );

        Ok(result)
    }

    fn spawn(&self, command: &str, env: &HashMap<String, String>) -> Result<Child, PipelineError> {
        let backend = self.config.backend;
        let mut cmd = Command::new(backend.program());
        cmd.args(backend.args());
        cmd.arg(command);
        if !self.config.cwd.as_os_str().is_empty() {
            cmd.current_dir(&self.config.cwd);
        }
        cmd.envs(env);
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            PipelineError::Io(format!("failed to start {}: {e}", backend.program()))
        })?;

        if let (Some(input), Some(mut pipe)) = (self.stdin.clone(), child.stdin.take()) {
            std::thread::spawn(move || {
                if let Err(e) = pipe.write_all(input.as_bytes()) {
                    tracing::warn!(error = %e, "Failed to write command stdin");
                }
            });
        }

        Ok(child)
    }

    /// Executes command with captured output
    fn execute_captured(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, PipelineError> {
        let output = self.spawn(command, env)?.wait_with_output()?;

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: Duration::ZERO,
        })
    }

    /// Executes command with streaming output
    fn execute_streaming(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, PipelineError> {
        let mut child = self.spawn(command, env)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Io("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Io("stderr not captured".to_string()))?;

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let stdout_thread = forward_lines(stdout, Arc::clone(&stdout_buf), |line| {
            println!("{line}");
        });
        let stderr_thread = forward_lines(stderr, Arc::clone(&stderr_buf), |line| {
            eprintln!("{line}");
        });

        let status = child.wait()?;
        let _ = stdout_thread.join();
        let _ = stderr_thread.join();

        let stdout = stdout_buf.lock().clone();
        let stderr = stderr_buf.lock().clone();

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
            duration: Duration::ZERO,
        })
    }
}

fn forward_lines<R, F>(
    source: R,
    sink: Arc<Mutex<String>>,
    echo: F,
) -> std::thread::JoinHandle<()>
where
    R: Read + Send + 'static,
    F: Fn(&str) + Send + 'static,
{
    std::thread::spawn(move || {
        let reader = io::BufReader::new(source);
        for line in reader.lines().map_while(Result::ok) {
            echo(&line);
            let mut guard = sink.lock();
            guard.push_str(&line);
            guard.push('\n');
        }
    })
}

static VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap_or_else(|e| panic!("variable pattern: {e}"))
});

/// Expands environment variables in a command string
///
/// Variables are expanded using the `${VAR_NAME}` syntax.
/// If a variable is not found, it remains unchanged in the output.
pub fn expand_variables(input: &str, env: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let var_name = caps.get(1).map_or("", |m| m.as_str());
            match env.get(var_name) {
                Some(value) => value.clone(),
                None => caps
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .to_string()
}
