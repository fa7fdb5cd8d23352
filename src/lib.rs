//! # stackci - a linear CI pipeline runner
//!
//! stackci runs the continuous-integration pipeline of a two-service web
//! application (backend + frontend): build and test, archive the package,
//! build container images, start the compose stack, wait for it to become
//! ready and publish the images.
//!
//! ## Model
//!
//! - A [`Pipeline`] is an ordered list of [`Stage`]s plus a post block.
//! - Each stage has an activation condition, a body of [`Step`]s and an
//!   ignore-failure flag. Inactive stages are skipped without running
//!   anything.
//! - The [`PipelineRunner`] runs stages in order and halts on the first
//!   failure of a stage not marked ignore-failure. The post block runs
//!   exactly once on every path, including configuration errors,
//!   cancellation and panics.
//! - Commands go through a [`CommandExecutor`]; the host backend (POSIX
//!   `sh` or PowerShell) is chosen once.
//! - Readiness checks use [`poll_until`]: bounded attempts with a fixed
//!   delay between them.
//! - [`resolve`] turns raw [`Settings`] and the environment into an
//!   immutable [`PipelineConfig`], including the image tag
//!   `<build-counter>-<7-char-revision>`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stackci::prelude::*;
//! use std::collections::HashMap;
//!
//! let settings = Settings::default();
//! let env: HashMap<String, String> = std::env::vars().collect();
//! let config = resolve(&settings, &env, std::env::current_dir().unwrap());
//!
//! let pipeline = webapp::pipeline(&settings);
//! let outcome = PipelineRunner::new(LocalExecutor::new()).run(&pipeline, config);
//! std::process::exit(if outcome.is_success() { 0 } else { 1 });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod macros;

pub mod executor;
pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{
    CommandExecutor, CommandRequest, DryRunExecutor, ExecutionResult, LocalExecutor,
    ShellBackend, expand_variables,
};
pub use infrastructure::Settings;
pub use pipeline::{
    CancelToken, Environment, Outcome, Pipeline, PipelineBuilder, PipelineConfig, PipelineError,
    PipelineOutcome, PipelineRunner, PostCondition, Stage, StageBuilder, Step, StepType, Validate,
    WhenCondition, poll_until, resolve, webapp,
};

/// Version of the stackci crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
