//! `stackci run` - Execute the pipeline

use super::ParamArgs;
use anyhow::{Context, Result};
use stackci::pipeline::{
    CancelToken, DEFAULT_ARTIFACT_ROOT, Outcome, PipelineOutcome, PipelineRunner, webapp,
};

/// Runs the pipeline and prints its report. Returns true on success.
pub fn run_pipeline(params: &ParamArgs, json: bool, cancel: CancelToken) -> Result<bool> {
    let invocation = params.prepare(!json)?;
    let pipeline = webapp::pipeline(&invocation.settings);

    tracing::info!(
        workspace = %invocation.workspace.display(),
        artifacts = %invocation.workspace.join(DEFAULT_ARTIFACT_ROOT).display(),
        "Running {pipeline}"
    );

    let runner = PipelineRunner::new(invocation.executor).with_cancel_token(cancel);
    let outcome = runner.run(&pipeline, invocation.config);

    if json {
        let report =
            serde_json::to_string_pretty(&outcome).context("Failed to serialize run report")?;
        println!("{report}");
    } else {
        println!("{}", format_report(&outcome));
    }

    Ok(outcome.is_success())
}

/// Renders a human readable summary of a run
pub fn format_report(outcome: &PipelineOutcome) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Run {}", outcome.run_id));

    for stage in &outcome.stages {
        let detail = match &stage.outcome {
            Outcome::Success => String::new(),
            Outcome::Skipped { reason } => format!(" ({reason})"),
            Outcome::Failure { reason } if stage.ignore_failure => {
                format!(" (ignored: {reason})")
            }
            Outcome::Failure { reason } => format!(" ({reason})"),
        };
        lines.push(format!(
            "  {:<8} {} [{} ms]{}",
            stage.outcome.to_string(),
            stage.name,
            stage.duration_ms,
            detail
        ));
    }

    if let Some(failure) = &outcome.failure {
        let stage = failure.stage.as_deref().unwrap_or("before any stage");
        lines.push(format!("Failed at {stage}: {}", failure.reason));
        if let Some(code) = failure.reason.exit_code {
            lines.push(format!("  exit code: {code}"));
        }
        if !failure.reason.output.is_empty() {
            lines.push(format!("  output: {}", failure.reason.output));
        }
    }

    for error in &outcome.teardown.errors {
        lines.push(format!("Teardown error: {error}"));
    }

    lines.push(format!(
        "Result: {} in {} ms",
        outcome.status, outcome.duration_ms
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackci::pipeline::{
        FailureReason, RunFailure, RunStatus, StageReport, TeardownReport,
    };

    #[test]
    fn test_format_report_names_failing_stage_and_exit_code() {
        let reason = FailureReason {
            message: "Command `mvn -B clean verify` failed with exit code 1: tests failed"
                .to_string(),
            exit_code: Some(1),
            output: "tests failed".to_string(),
        };
        let outcome = PipelineOutcome {
            run_id: "run-1".to_string(),
            status: RunStatus::Failure,
            stages: vec![StageReport {
                name: "Backend Build".to_string(),
                outcome: Outcome::Failure {
                    reason: reason.clone(),
                },
                ignore_failure: false,
                duration_ms: 12,
            }],
            failure: Some(RunFailure {
                stage: Some("Backend Build".to_string()),
                reason,
            }),
            teardown: TeardownReport {
                runs: 1,
                errors: vec!["logs failed".to_string()],
            },
            duration_ms: 20,
        };

        let report = format_report(&outcome);
        assert!(report.contains("FAILURE  Backend Build [12 ms]"));
        assert!(report.contains("Failed at Backend Build"));
        assert!(report.contains("exit code: 1"));
        assert!(report.contains("Teardown error: logs failed"));
        assert!(report.ends_with("Result: FAILURE in 20 ms"));
    }
}
