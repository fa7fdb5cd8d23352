//! Prelude module for common imports

// Re-export macros
pub use crate::{echo, post, sh, stage, steps, when};

pub use crate::infrastructure::{Settings, init_logging};
pub use crate::pipeline::errors::{PipelineError, ValidationError};
pub use crate::pipeline::pipeline_def::{Pipeline, PipelineBuilder};
pub use crate::pipeline::post::PostCondition;
pub use crate::pipeline::stage::{ConfigField, ConfigFlag, Stage, StageBuilder, WhenCondition};
pub use crate::pipeline::steps::{Probe, Step, StepType};
pub use crate::pipeline::types::{Outcome, PipelineOutcome, RunStatus, Validate};
pub use crate::pipeline::{
    CancelToken, Environment, PipelineConfig, PipelineRunner, poll_until, resolve, webapp,
};

// Re-export executor types
pub use crate::executor::{CommandExecutor, CommandRequest, ExecutionResult, LocalExecutor};
