//! Pipeline runner
//!
//! Executes stages in declaration order, halts on the first failure of a
//! stage that is not marked ignore-failure, and runs the post block exactly
//! once on every path: success, failure, configuration error, cancellation
//! and unwinding.

use super::Environment;
use super::cancel::CancelToken;
use super::config::PipelineConfig;
use super::errors::PipelineError;
use super::pipeline_def::Pipeline;
use super::poll::{Sleeper, ThreadSleeper, poll_until_with};
use super::stage::Stage;
use super::steps::{Probe, Step, StepType};
use super::types::{
    FailureReason, Outcome, PipelineOutcome, RunFailure, RunState, RunStatus, StageReport,
    TeardownReport, Validate,
};
use crate::executor::{CommandExecutor, CommandRequest, DryRunExecutor};
use crate::infrastructure::archive_artifacts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Default artifact directory, relative to the workspace
pub const DEFAULT_ARTIFACT_ROOT: &str = ".stackci/artifacts";

/// Everything a stage body needs while it runs
pub struct StageContext<'a> {
    config: Option<&'a PipelineConfig>,
    vars: &'a Environment,
    secrets: &'a Environment,
    executor: &'a dyn CommandExecutor,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
    workspace: &'a Path,
    artifact_dir: &'a Path,
    dry_run: bool,
}

impl StageContext<'_> {
    /// Resolved configuration; absent when resolution failed
    pub fn config(&self) -> Option<&PipelineConfig> {
        self.config
    }

    /// Variables available to commands
    pub fn vars(&self) -> &Environment {
        self.vars
    }

    /// Runs steps in order, stopping at the first error
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub fn execute_steps(&self, steps: &[Step]) -> Result<(), PipelineError> {
        steps.iter().try_for_each(|step| self.execute_step(step))
    }

    /// Runs a single step
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CommandFailed`] for a non-zero exit of a
    /// shell step not marked ignore-failure, [`PipelineError::RetryExhausted`]
    /// when a poll never succeeds, [`PipelineError::Cancelled`] when a poll
    /// is interrupted, and archive or spawn errors as they occur.
    pub fn execute_step(&self, step: &Step) -> Result<(), PipelineError> {
        match &step.step_type {
            StepType::Shell {
                command,
                dir,
                stdin,
                ignore_failure,
            } => self.shell(command, dir.as_deref(), stdin.as_deref(), *ignore_failure),
            StepType::Echo { message } => {
                if !self.dry_run {
                    tracing::info!(message = %self.vars.resolve(message), "Echo");
                }
                Ok(())
            }
            StepType::Branch {
                condition,
                then,
                otherwise,
            } => match self.config {
                Some(config) => {
                    let holds = condition.evaluate(config);
                    tracing::debug!(condition = %condition, holds, "Evaluated branch");
                    self.execute_steps(if holds { then } else { otherwise })
                }
                None => {
                    tracing::warn!(condition = %condition, "Configuration unavailable, skipping conditional step");
                    Ok(())
                }
            },
            StepType::Poll {
                probe,
                attempts,
                delay,
            } => {
                if self.dry_run {
                    self.probe(probe, 1);
                    return Ok(());
                }

                tracing::info!(probe = %probe, attempts, delay_ms = delay.as_millis(), "Waiting for readiness");
                if poll_until_with(|attempt| self.probe(probe, attempt), *attempts, *delay, self.sleeper) {
                    Ok(())
                } else if self.cancel.is_cancelled() {
                    Err(PipelineError::Cancelled)
                } else {
                    Err(PipelineError::RetryExhausted {
                        probe: probe.to_string(),
                        attempts: *attempts,
                    })
                }
            }
            StepType::Archive {
                pattern,
                allow_empty,
            } => {
                let pattern = self.vars.resolve(pattern);
                if self.dry_run {
                    tracing::debug!(pattern = %pattern, "Would archive artifacts");
                    return Ok(());
                }
                let archived =
                    archive_artifacts(self.workspace, &pattern, self.artifact_dir, *allow_empty)?;
                tracing::info!(pattern = %pattern, count = archived.len(), "Artifacts archived");
                Ok(())
            }
        }
    }

    fn shell(
        &self,
        command: &str,
        dir: Option<&str>,
        stdin: Option<&str>,
        ignore_failure: bool,
    ) -> Result<(), PipelineError> {
        let rendered = self.vars.resolve(command);
        let dir = dir.map(|d| PathBuf::from(self.vars.resolve(d)));
        let input = stdin.map(|s| self.vars.merged(self.secrets).resolve(s));

        if !self.dry_run {
            tracing::info!(command = %rendered, "Running command");
        }
        let request = CommandRequest::new(&rendered, self.vars)
            .in_dir(dir.as_deref())
            .with_stdin(input.as_deref());
        let result = self.executor.run(&request)?;

        if result.is_success() {
            return Ok(());
        }

        let err = PipelineError::CommandFailed {
            command: rendered.clone(),
            code: result.exit_code,
            output: result.diagnostic_output().to_string(),
        };
        if ignore_failure {
            tracing::warn!(command = %rendered, exit_code = result.exit_code, "Command failed, ignoring");
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Runs one probe attempt. The decision is made on the parsed output;
    /// the exit code is only logged.
    fn probe(&self, probe: &Probe, attempt: u32) -> bool {
        let (command, expected) = match probe {
            Probe::OutputEquals { command, expected } => {
                (self.vars.resolve(command), self.vars.resolve(expected))
            }
            Probe::HttpStatus { url, expected } => (
                self.executor
                    .backend()
                    .http_status_command(&self.vars.resolve(url)),
                expected.to_string(),
            ),
        };

        let request = CommandRequest::new(&command, self.vars).quiet();
        match self.executor.run(&request) {
            Ok(result) => {
                let observed = result.stdout.trim();
                let ready = match probe {
                    Probe::OutputEquals { .. } => observed == expected,
                    Probe::HttpStatus { expected, .. } => {
                        observed.parse::<u16>().ok() == Some(*expected)
                    }
                };
                tracing::info!(
                    attempt,
                    observed = %observed,
                    expected = %expected,
                    exit_code = result.exit_code,
                    ready,
                    "Readiness probe"
                );
                ready
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "Readiness probe could not run");
                false
            }
        }
    }
}

/// Runs the teardown closure exactly once, on drop if not finished explicitly
struct TeardownGuard<F>
where
    F: FnOnce(RunStatus) -> TeardownReport,
{
    teardown: Option<F>,
}

impl<F> TeardownGuard<F>
where
    F: FnOnce(RunStatus) -> TeardownReport,
{
    fn new(teardown: F) -> Self {
        Self {
            teardown: Some(teardown),
        }
    }

    fn finish(mut self, status: RunStatus) -> TeardownReport {
        self.teardown
            .take()
            .map_or_else(TeardownReport::default, |teardown| teardown(status))
    }
}

impl<F> Drop for TeardownGuard<F>
where
    F: FnOnce(RunStatus) -> TeardownReport,
{
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            tracing::error!("Run interrupted, running teardown");
            let _ = teardown(RunStatus::Failure);
        }
    }
}

/// What a stage would do under a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStage {
    /// Stage name
    pub name: String,
    /// Whether the stage would run
    pub active: bool,
    /// Why an inactive stage would be skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Commands the stage would issue, variables expanded
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub commands: Vec<String>,
}

/// What a run would do under a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Stages in execution order
    pub stages: Vec<PlannedStage>,
    /// Commands the post block would issue after a successful run
    pub teardown: Vec<String>,
}

/// Executes pipelines against a [`CommandExecutor`]
pub struct PipelineRunner<E> {
    executor: E,
    sleeper: Option<Arc<dyn Sleeper>>,
    cancel: CancelToken,
    artifact_root: PathBuf,
}

impl<E: CommandExecutor> PipelineRunner<E> {
    /// Creates a runner
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            sleeper: None,
            cancel: CancelToken::new(),
            artifact_root: PathBuf::from(DEFAULT_ARTIFACT_ROOT),
        }
    }

    /// Observes `cancel` between stages and during polling
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the thread sleeper used between poll attempts
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Sets the artifact directory; relative paths are resolved against the workspace
    #[must_use]
    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = root.into();
        self
    }

    /// Returns the executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs `pipeline` with a configuration that may have failed to resolve.
    ///
    /// An invalid pipeline definition or a configuration error fails the run
    /// before any stage starts; the post block still runs once with the
    /// variables known up front.
    pub fn run(
        &self,
        pipeline: &Pipeline,
        config: Result<PipelineConfig, PipelineError>,
    ) -> PipelineOutcome {
        match pipeline.validate().map_err(PipelineError::from).and(config) {
            Ok(config) => self.execute(pipeline, &config),
            Err(err) => self.abort(pipeline, &err),
        }
    }

    /// Runs every stage of `pipeline` in order, then the post block
    pub fn execute(&self, pipeline: &Pipeline, config: &PipelineConfig) -> PipelineOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        let mut state = RunState::NotStarted;

        tracing::info!(
            run_id = %run_id,
            pipeline = %pipeline.name.as_deref().unwrap_or("unnamed"),
            stages = pipeline.stages.len(),
            image_tag = %config.image_tag,
            "Starting pipeline"
        );

        let vars = pipeline.environment.merged(&config.variables());
        let secrets = config.secrets();
        let sleeper = self.sleeper();
        let artifact_dir = self.artifact_dir(&config.workspace, &config.image_tag);
        let ctx = StageContext {
            config: Some(config),
            vars: &vars,
            secrets: &secrets,
            executor: &self.executor,
            sleeper: sleeper.as_ref(),
            cancel: &self.cancel,
            workspace: &config.workspace,
            artifact_dir: &artifact_dir,
            dry_run: false,
        };

        let guard = TeardownGuard::new(|status| self.teardown(pipeline, &ctx, status));
        transition(&mut state, RunState::Running);

        let mut stages = Vec::with_capacity(pipeline.stages.len());
        let mut failure = None;

        for stage in &pipeline.stages {
            if self.cancel.is_cancelled() {
                tracing::warn!(stage = %stage.name, "Run cancelled, not starting stage");
                failure = Some(RunFailure {
                    stage: None,
                    reason: FailureReason::from(&PipelineError::Cancelled),
                });
                break;
            }

            let report = run_stage(stage, &ctx);
            let halt = match &report.outcome {
                Outcome::Failure { reason } if !stage.ignore_failure => {
                    failure = Some(RunFailure {
                        stage: Some(stage.name.clone()),
                        reason: reason.clone(),
                    });
                    true
                }
                _ => false,
            };
            stages.push(report);

            if halt {
                tracing::error!(stage = %stage.name, "Stage failed, halting pipeline");
                break;
            }
        }

        let status = if failure.is_some() {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };

        transition(&mut state, RunState::Teardown);
        let teardown = guard.finish(status);
        transition(&mut state, RunState::Completed(status));

        let duration_ms = start.elapsed().as_millis();
        tracing::info!(run_id = %run_id, status = %status, duration_ms, "Pipeline finished");

        PipelineOutcome {
            run_id,
            status,
            stages,
            failure,
            teardown,
            duration_ms,
        }
    }

    /// Resolves which stages would run and the commands they would issue
    /// without executing anything
    pub fn plan(&self, pipeline: &Pipeline, config: &PipelineConfig) -> RunPlan {
        let recorder = DryRunExecutor::new(self.executor.backend());
        let vars = pipeline.environment.merged(&config.variables());
        let sleeper = ThreadSleeper::default();
        let secrets = Environment::new();
        let ctx = StageContext {
            config: Some(config),
            vars: &vars,
            secrets: &secrets,
            executor: &recorder,
            sleeper: &sleeper,
            cancel: &self.cancel,
            workspace: &config.workspace,
            artifact_dir: &config.workspace,
            dry_run: true,
        };

        let stages = pipeline
            .stages
            .iter()
            .map(|stage| {
                let active = stage.activate(config);
                if active {
                    if let Err(err) = ctx.execute_steps(&stage.steps) {
                        tracing::warn!(stage = %stage.name, error = %err, "Dry run of stage failed");
                    }
                }
                PlannedStage {
                    name: stage.name.clone(),
                    active,
                    reason: (!active).then(|| stage.skip_reason()),
                    commands: recorder.take().into_iter().map(|c| c.command).collect(),
                }
            })
            .collect();

        for post in pipeline
            .post
            .iter()
            .filter(|p| p.should_execute(RunStatus::Success))
        {
            if let Err(err) = ctx.execute_steps(post.steps()) {
                tracing::warn!(error = %err, "Dry run of post block failed");
            }
        }
        let teardown = recorder.take().into_iter().map(|c| c.command).collect();

        RunPlan { stages, teardown }
    }

    fn abort(&self, pipeline: &Pipeline, err: &PipelineError) -> PipelineOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        let mut state = RunState::NotStarted;

        tracing::error!(run_id = %run_id, error = %err, "Configuration could not be resolved, no stage will run");

        let sleeper = self.sleeper();
        let workspace = PathBuf::new();
        let secrets = Environment::new();
        let ctx = StageContext {
            config: None,
            vars: &pipeline.environment,
            secrets: &secrets,
            executor: &self.executor,
            sleeper: sleeper.as_ref(),
            cancel: &self.cancel,
            workspace: &workspace,
            artifact_dir: &workspace,
            dry_run: false,
        };

        transition(&mut state, RunState::Teardown);
        let teardown = TeardownGuard::new(|status| self.teardown(pipeline, &ctx, status))
            .finish(RunStatus::Failure);
        transition(&mut state, RunState::Completed(RunStatus::Failure));

        PipelineOutcome {
            run_id,
            status: RunStatus::Failure,
            stages: Vec::new(),
            failure: Some(RunFailure {
                stage: None,
                reason: FailureReason::from(err),
            }),
            teardown,
            duration_ms: start.elapsed().as_millis(),
        }
    }

    /// Runs every applicable post step; failures are logged and recorded,
    /// never propagated
    fn teardown(
        &self,
        pipeline: &Pipeline,
        ctx: &StageContext<'_>,
        status: RunStatus,
    ) -> TeardownReport {
        tracing::info!(status = %status, "Running teardown");
        let mut report = TeardownReport {
            runs: 1,
            errors: Vec::new(),
        };

        for post in pipeline.post.iter().filter(|p| p.should_execute(status)) {
            for step in post.steps() {
                if let Err(err) = ctx.execute_step(step) {
                    tracing::error!(step = %step, error = %err, "Teardown step failed");
                    report.errors.push(err.to_string());
                }
            }
        }

        report
    }

    fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper
            .clone()
            .unwrap_or_else(|| Arc::new(ThreadSleeper::new(self.cancel.clone())))
    }

    fn artifact_dir(&self, workspace: &Path, image_tag: &str) -> PathBuf {
        workspace.join(&self.artifact_root).join(image_tag)
    }
}

fn run_stage(stage: &Stage, ctx: &StageContext<'_>) -> StageReport {
    let start = Instant::now();
    tracing::info!(stage = %stage.name, "Starting stage");

    let outcome = stage.run(ctx);
    let duration_ms = start.elapsed().as_millis();

    match &outcome {
        Outcome::Success => {
            tracing::info!(stage = %stage.name, duration_ms, "Stage completed");
        }
        Outcome::Skipped { reason } => {
            tracing::info!(stage = %stage.name, reason = %reason, "Stage skipped");
        }
        Outcome::Failure { reason } if stage.ignore_failure => {
            tracing::warn!(stage = %stage.name, reason = %reason, duration_ms, "Stage failed, ignoring");
        }
        Outcome::Failure { reason } => {
            tracing::error!(
                stage = %stage.name,
                reason = %reason,
                exit_code = ?reason.exit_code,
                duration_ms,
                "Stage failed"
            );
        }
    }

    StageReport {
        name: stage.name.clone(),
        outcome,
        ignore_failure: stage.ignore_failure,
        duration_ms,
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug_assert!(state.can_transition_to(next), "{state:?} -> {next:?}");
    tracing::debug!(from = ?state, to = ?next, "Run state changed");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionResult, ShellBackend};
    use crate::pipeline::config::tests::sample_config;
    use crate::pipeline::poll::tests::RecordingSleeper;
    use crate::pipeline::{ConfigFlag, PostCondition, WhenCondition};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Fails commands containing `fail`, prints `healthy` for `inspect`
    #[derive(Default)]
    struct FakeExecutor {
        commands: Mutex<Vec<String>>,
        stdins: Mutex<Vec<String>>,
        exported: Mutex<Vec<Environment>>,
        inspect_calls: Mutex<u32>,
        healthy_after: u32,
    }

    impl FakeExecutor {
        fn commands(&self) -> Vec<String> {
            self.commands.lock().clone()
        }
    }

    impl CommandExecutor for FakeExecutor {
        fn run(&self, request: &CommandRequest<'_>) -> Result<ExecutionResult, PipelineError> {
            let command = request.command.to_string();
            self.commands.lock().push(command.clone());
            self.exported.lock().push(request.env.clone());
            if let Some(input) = request.stdin {
                self.stdins.lock().push(input.to_string());
            }

            if command.contains("panic") {
                panic!("executor blew up");
            }

            let mut result = ExecutionResult::default();
            if command.contains("fail") {
                result.exit_code = 2;
                result.stderr = "boom".to_string();
            }
            if command.contains("inspect") {
                let mut calls = self.inspect_calls.lock();
                *calls += 1;
                result.stdout = if *calls >= self.healthy_after {
                    "healthy\n".to_string()
                } else {
                    "starting\n".to_string()
                };
            }
            Ok(result)
        }

        fn backend(&self) -> ShellBackend {
            ShellBackend::Posix
        }
    }

    fn runner(executor: &FakeExecutor) -> PipelineRunner<&FakeExecutor> {
        PipelineRunner::new(executor).with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    fn pipeline(stages: Vec<Stage>) -> Pipeline {
        Pipeline::builder()
            .stages(stages)
            .post(PostCondition::always(vec![Step::shell("teardown")]))
            .build()
            .unwrap()
    }

    fn teardown_count(commands: &[String]) -> usize {
        commands.iter().filter(|c| c.as_str() == "teardown").count()
    }

    #[test]
    fn test_all_stages_succeed() {
        let executor = FakeExecutor::default();
        let outcome = runner(&executor).execute(
            &pipeline(vec![
                Stage::new("One", vec![Step::shell("one")]),
                Stage::new("Two", vec![Step::shell("two")]),
            ]),
            &sample_config(),
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.executed_stages(), vec!["One", "Two"]);
        assert_eq!(outcome.teardown.runs, 1);
        assert_eq!(executor.commands(), vec!["one", "two", "teardown"]);
    }

    #[test]
    fn test_failure_halts_and_teardown_runs_once() {
        let executor = FakeExecutor::default();
        let outcome = runner(&executor).execute(
            &pipeline(vec![
                Stage::new("One", vec![Step::shell("one")]),
                Stage::new("Two", vec![Step::shell("fail here")]),
                Stage::new("Three", vec![Step::shell("three")]),
            ]),
            &sample_config(),
        );

        assert!(!outcome.is_success());
        assert!(outcome.stage("Three").is_none());
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.stage.as_deref(), Some("Two"));
        assert_eq!(failure.reason.exit_code, Some(2));
        assert_eq!(failure.reason.output, "boom");
        assert_eq!(teardown_count(&executor.commands()), 1);
    }

    #[test]
    fn test_ignore_failure_stage_does_not_halt() {
        let executor = FakeExecutor::default();
        let outcome = runner(&executor).execute(
            &pipeline(vec![
                Stage::new("Flaky", vec![Step::shell("fail")]).ignoring_failure(),
                Stage::new("Next", vec![Step::shell("next")]),
            ]),
            &sample_config(),
        );

        assert!(outcome.is_success());
        assert!(outcome.stage("Flaky").unwrap().outcome.is_failure());
        assert!(outcome.stage("Next").unwrap().outcome.is_success());
    }

    #[test]
    fn test_ignore_failure_step_continues_stage() {
        let executor = FakeExecutor::default();
        let outcome = runner(&executor).execute(
            &pipeline(vec![Stage::new(
                "Stack Up",
                vec![Step::shell("fail down").ignoring_failure(), Step::shell("up")],
            )]),
            &sample_config(),
        );

        assert!(outcome.is_success());
        assert_eq!(executor.commands(), vec!["fail down", "up", "teardown"]);
    }

    #[test]
    fn test_inactive_stage_is_skipped_without_executor() {
        let executor = FakeExecutor::default();
        let outcome = runner(&executor).execute(
            &pipeline(vec![
                Stage::new("Tests", vec![Step::shell("tests")])
                    .with_when(WhenCondition::flag(ConfigFlag::RunTests)),
            ]),
            &sample_config(),
        );

        assert!(outcome.is_success());
        assert!(outcome.stage("Tests").unwrap().outcome.is_skipped());
        assert_eq!(executor.commands(), vec!["teardown"]);
    }

    #[test]
    fn test_branch_runs_exactly_one_side() {
        let executor = FakeExecutor::default();
        let mut config = sample_config();
        config.run_tests = true;
        let build = Stage::new(
            "Build",
            vec![Step::branch(
                WhenCondition::flag(ConfigFlag::RunTests),
                vec![Step::shell("verify")],
                vec![Step::shell("package")],
            )],
        );

        runner(&executor).execute(&pipeline(vec![build]), &config);
        assert_eq!(executor.commands(), vec!["verify", "teardown"]);
    }

    #[test]
    fn test_poll_succeeds_on_third_attempt() {
        let executor = FakeExecutor {
            healthy_after: 3,
            ..FakeExecutor::default()
        };
        let sleeper = Arc::new(RecordingSleeper::default());
        let stage = Stage::new(
            "Readiness",
            vec![Step::poll(
                Probe::output_equals("docker inspect app", "healthy"),
                12,
                Duration::from_secs(10),
            )],
        );

        let outcome = PipelineRunner::new(&executor)
            .with_sleeper(sleeper.clone())
            .execute(&pipeline(vec![stage]), &sample_config());

        assert!(outcome.is_success());
        assert_eq!(*executor.inspect_calls.lock(), 3);
        let total: Duration = sleeper.slept.lock().iter().sum();
        assert_eq!(total, Duration::from_secs(20));
    }

    #[test]
    fn test_poll_exhausted_fails_stage() {
        let executor = FakeExecutor {
            healthy_after: u32::MAX,
            ..FakeExecutor::default()
        };
        let stage = Stage::new(
            "Readiness",
            vec![Step::poll(
                Probe::output_equals("docker inspect app", "healthy"),
                12,
                Duration::from_secs(10),
            )],
        );

        let outcome = runner(&executor).execute(&pipeline(vec![stage]), &sample_config());

        assert!(!outcome.is_success());
        assert_eq!(*executor.inspect_calls.lock(), 12);
        assert!(outcome.failure.unwrap().reason.message.contains("12 attempts"));
    }

    #[test]
    fn test_http_probe_uses_backend_command() {
        let executor = FakeExecutor::default();
        let stage = Stage::new(
            "Readiness",
            vec![Step::poll(Probe::http_ok("${HEALTH_URL}"), 1, Duration::ZERO)],
        );

        let outcome = runner(&executor).execute(&pipeline(vec![stage]), &sample_config());

        assert!(!outcome.is_success());
        assert_eq!(
            executor.commands()[0],
            "curl -s -o /dev/null -w '%{http_code}' http://localhost:8080/"
        );
    }

    #[test]
    fn test_configuration_error_runs_teardown_once() {
        let executor = FakeExecutor::default();
        let outcome = runner(&executor).run(
            &pipeline(vec![Stage::new("One", vec![Step::shell("one")])]),
            Err(PipelineError::Configuration("no revision".to_string())),
        );

        assert!(!outcome.is_success());
        assert!(outcome.stages.is_empty());
        let failure = outcome.failure.unwrap();
        assert!(failure.stage.is_none());
        assert!(failure.reason.message.contains("no revision"));
        assert_eq!(executor.commands(), vec!["teardown"]);
        assert_eq!(outcome.teardown.runs, 1);
    }

    #[test]
    fn test_secrets_only_reach_stdin() {
        let executor = FakeExecutor::default();
        let mut config = sample_config();
        config.registry = "registry.example.com".to_string();
        config.credentials_id = "registry-creds".to_string();
        config.credentials = Some(crate::pipeline::RegistryCredentials {
            username: "ci".to_string(),
            password: "s3cret".to_string(),
        });

        let outcome = runner(&executor).execute(
            &pipeline(vec![Stage::new(
                "Login",
                vec![
                    Step::shell("login ${REGISTRY_USERNAME} ${REGISTRY_PASSWORD}")
                        .with_stdin("${REGISTRY_PASSWORD}"),
                ],
            )]),
            &config,
        );

        assert!(outcome.is_success());
        assert_eq!(executor.commands()[0], "login ci ${REGISTRY_PASSWORD}");
        assert_eq!(*executor.stdins.lock(), vec!["s3cret"]);
        assert!(
            executor
                .exported
                .lock()
                .iter()
                .all(|env| env.vars.values().all(|v| v != "s3cret"))
        );
    }

    #[test]
    fn test_invalid_definition_fails_before_any_stage() {
        let executor = FakeExecutor::default();
        let invalid = Pipeline::builder()
            .stage(Stage::new("Twice", vec![Step::shell("one")]))
            .stage(Stage::new("Twice", vec![Step::shell("two")]))
            .post(PostCondition::always(vec![Step::shell("teardown")]))
            .build_unchecked();

        let outcome = runner(&executor).run(&invalid, Ok(sample_config()));

        assert!(!outcome.is_success());
        assert!(outcome.stages.is_empty());
        assert!(outcome.failure.unwrap().reason.message.contains("Duplicate stage name"));
        assert_eq!(executor.commands(), vec!["teardown"]);
    }

    #[test]
    fn test_teardown_failures_are_recorded_not_propagated() {
        let executor = FakeExecutor::default();
        let pipeline = Pipeline::builder()
            .stage(Stage::new("One", vec![Step::shell("one")]))
            .post(PostCondition::always(vec![
                Step::shell("fail logs"),
                Step::shell("teardown"),
            ]))
            .build()
            .unwrap();

        let outcome = runner(&executor).execute(&pipeline, &sample_config());

        assert!(outcome.is_success());
        assert_eq!(outcome.teardown.errors.len(), 1);
        assert_eq!(executor.commands(), vec!["one", "fail logs", "teardown"]);
    }

    #[test]
    fn test_post_blocks_follow_status() {
        let executor = FakeExecutor::default();
        let pipeline = Pipeline::builder()
            .stage(Stage::new("One", vec![Step::shell("fail")]))
            .post(PostCondition::failure(vec![Step::shell("logs")]))
            .post(PostCondition::success(vec![Step::shell("celebrate")]))
            .build()
            .unwrap();

        runner(&executor).execute(&pipeline, &sample_config());
        assert_eq!(executor.commands(), vec!["fail", "logs"]);
    }

    #[test]
    fn test_cancelled_run_starts_no_stage() {
        let executor = FakeExecutor::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = runner(&executor)
            .with_cancel_token(cancel)
            .execute(
                &pipeline(vec![Stage::new("One", vec![Step::shell("one")])]),
                &sample_config(),
            );

        assert!(!outcome.is_success());
        assert!(outcome.stages.is_empty());
        assert_eq!(executor.commands(), vec!["teardown"]);
    }

    #[test]
    fn test_panic_still_runs_teardown() {
        let executor = FakeExecutor::default();
        let pipeline = pipeline(vec![Stage::new("Boom", vec![Step::shell("panic")])]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runner(&executor).execute(&pipeline, &sample_config())
        }));

        assert!(result.is_err());
        assert_eq!(executor.commands(), vec!["panic", "teardown"]);
    }

    #[test]
    fn test_plan_lists_commands_without_running() {
        let executor = FakeExecutor::default();
        let pipeline = Pipeline::builder()
            .stage(Stage::new(
                "Build",
                vec![Step::shell("build ${IMAGE_TAG}")],
            ))
            .stage(
                Stage::new("Tests", vec![Step::shell("tests")])
                    .with_when(WhenCondition::flag(ConfigFlag::RunTests)),
            )
            .post(PostCondition::always(vec![Step::shell("down")]))
            .build()
            .unwrap();

        let plan = runner(&executor).plan(&pipeline, &sample_config());

        assert!(executor.commands().is_empty());
        assert_eq!(plan.stages[0].commands, vec!["build 42-abcdef1"]);
        assert!(plan.stages[0].active);
        assert!(!plan.stages[1].active);
        assert!(plan.stages[1].reason.is_some());
        assert_eq!(plan.teardown, vec!["down"]);
    }
}
