//! Command execution layer
//!
//! This module contains the executor trait and its implementations.

mod dry_run;
mod local;
mod shell;
mod traits;

pub use dry_run::{DryRunExecutor, RecordedCommand};
pub use local::{ExecutorConfig, LocalExecutor};
pub use shell::{ExecutionResult, ShellBackend, ShellCommand, ShellConfig, expand_variables};
pub use traits::{CommandExecutor, CommandRequest};
