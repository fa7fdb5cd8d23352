//! Shared helpers for the integration scenarios

#![allow(dead_code)]

use parking_lot::Mutex;
use stackci::executor::{CommandExecutor, CommandRequest, ExecutionResult, ShellBackend};
use stackci::infrastructure::Settings;
use stackci::pipeline::{Environment, PipelineConfig, PipelineError, Sleeper, resolve};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A command issued to the [`ScriptedExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub command: String,
    pub stdin: Option<String>,
    pub env: Environment,
}

struct Rule {
    needle: String,
    exit_code: i32,
    outputs: Vec<String>,
    calls: usize,
}

/// Answers commands by substring rules; unmatched commands succeed silently
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    issued: Mutex<Vec<Issued>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` exit with `exit_code`
    pub fn exits(self, needle: &str, exit_code: i32) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            exit_code,
            outputs: Vec::new(),
            calls: 0,
        });
        self
    }

    /// Commands containing `needle` print `outputs` in turn, repeating the last
    pub fn prints(self, needle: &str, outputs: &[&str]) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            exit_code: 0,
            outputs: outputs.iter().map(ToString::to_string).collect(),
            calls: 0,
        });
        self
    }

    /// A healthy stack: container healthy, HTTP 200
    pub fn healthy_stack() -> Self {
        Self::new()
            .prints("docker inspect", &["healthy"])
            .prints("curl", &["200"])
    }

    pub fn issued(&self) -> Vec<Issued> {
        self.issued.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.issued().into_iter().map(|i| i.command).collect()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
        let command = request.command.to_string();
        self.issued.lock().push(Issued {
            command: command.clone(),
            stdin: request.stdin.map(ToString::to_string),
            env: request.env.clone(),
        });

        let mut result = ExecutionResult::default();
        let mut rules = self.rules.lock();
        if let Some(rule) = rules.iter_mut().find(|r| command.contains(&r.needle)) {
            result.exit_code = rule.exit_code;
            if let Some(last) = rule.outputs.last() {
                result.stdout = rule.outputs.get(rule.calls).unwrap_or(last).clone();
            }
            if rule.exit_code != 0 {
                result.stderr = format!("{} failed", rule.needle);
            }
            rule.calls += 1;
        }
        Ok(result)
    }

    fn backend(&self) -> ShellBackend {
        ShellBackend::Posix
    }
}

/// Records requested sleeps instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> bool {
        self.slept.lock().push(duration);
        true
    }
}

/// Settings with a build counter and a full revision hash
pub fn settings() -> Settings {
    Settings {
        build_number: Some("42".to_string()),
        revision: Some("abcdef1234567890abcdef1234567890abcdef12".to_string()),
        ..Settings::default()
    }
}

pub fn config(settings: &Settings, workspace: &Path) -> PipelineConfig {
    config_with_env(settings, workspace, &HashMap::new())
}

pub fn config_with_env(
    settings: &Settings,
    workspace: &Path,
    env: &HashMap<String, String>,
) -> PipelineConfig {
    resolve(settings, env, workspace).unwrap()
}

/// Registry login secrets as a CI server would export them
pub fn registry_env() -> HashMap<String, String> {
    HashMap::from([
        ("REGISTRY_USERNAME".to_string(), "ci-bot".to_string()),
        ("REGISTRY_PASSWORD".to_string(), "s3cret".to_string()),
    ])
}
