//! `stackci plan` - Show what a run would do

use super::ParamArgs;
use anyhow::{Context, Result};
use stackci::pipeline::{PipelineRunner, RunPlan, webapp};

/// Resolves the configuration and prints the plan without running anything
pub fn plan_pipeline(params: &ParamArgs, json: bool) -> Result<()> {
    let invocation = params.prepare(false)?;
    let config = invocation
        .config
        .context("Cannot plan without a resolved configuration")?;
    let pipeline = webapp::pipeline(&invocation.settings);

    let plan = PipelineRunner::new(invocation.executor).plan(&pipeline, &config);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
        );
    } else {
        println!("Image tag: {}", config.image_tag);
        println!("{}", format_plan(&plan));
    }
    Ok(())
}

/// Renders a plan as indented text
pub fn format_plan(plan: &RunPlan) -> String {
    let mut lines = Vec::new();
    for stage in &plan.stages {
        match &stage.reason {
            Some(reason) => lines.push(format!("- {} (skipped: {reason})", stage.name)),
            None => lines.push(format!("- {}", stage.name)),
        }
        lines.extend(stage.commands.iter().map(|c| format!("    $ {c}")));
    }
    if !plan.teardown.is_empty() {
        lines.push("- teardown".to_string());
        lines.extend(plan.teardown.iter().map(|c| format!("    $ {c}")));
    }
    lines.join("\n")
}
