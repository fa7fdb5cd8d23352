//! CLI for stackci
//!
//! - `run`: execute the web application pipeline
//! - `plan`: show which stages would run and the commands they would issue
//! - `completions`: generate shell completions

pub mod completions;
pub mod plan;
pub mod run;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use stackci::executor::{CommandExecutor, CommandRequest, LocalExecutor, ShellBackend};
use stackci::infrastructure::{DEFAULT_SETTINGS_FILE, Settings, init_logging};
use stackci::pipeline::{CancelToken, Environment, PipelineConfig, PipelineError, resolve};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

/// CLI arguments for stackci
#[derive(Parser, Debug)]
#[command(name = "stackci")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log at debug level (`RUST_LOG` takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline
    Run {
        #[command(flatten)]
        params: ParamArgs,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which stages would run and the commands they would issue
    Plan {
        #[command(flatten)]
        params: ParamArgs,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Invocation parameters shared by `run` and `plan`
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ParamArgs {
    /// Settings file (default: stackci.yaml in the workspace, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry endpoint; empty disables publishing
    #[arg(long)]
    registry: Option<String>,

    /// Image name prefix
    #[arg(long)]
    image_prefix: Option<String>,

    /// Credentials reference; empty disables publishing
    #[arg(long)]
    credentials: Option<String>,

    /// Run the full test suite instead of packaging only
    #[arg(long)]
    run_tests: bool,

    /// Leave the stack running after the pipeline
    #[arg(long, value_name = "BOOL")]
    keep_running: Option<bool>,

    /// Build counter (default: $BUILD_NUMBER)
    #[arg(long)]
    build_number: Option<String>,

    /// Source revision (default: $GIT_COMMIT, then `git rev-parse HEAD`)
    #[arg(long)]
    revision: Option<String>,

    /// Branch being built (default: $BRANCH_NAME or $GIT_BRANCH)
    #[arg(long)]
    branch: Option<String>,

    /// Workspace root (default: current directory)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Command interpreter (default: native to the platform)
    #[arg(long, value_enum)]
    shell: Option<BackendArg>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Posix,
    Powershell,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Everything `run` and `plan` need before touching the pipeline
pub struct Invocation {
    /// Settings after merging file and flags
    pub settings: Settings,
    /// Workspace root
    pub workspace: PathBuf,
    /// Executor for the chosen backend
    pub executor: LocalExecutor,
    /// Resolved configuration, or why resolution failed
    pub config: Result<PipelineConfig, PipelineError>,
}

impl ParamArgs {
    fn overrides(&self) -> Settings {
        Settings {
            registry: self.registry.clone(),
            image_prefix: self.image_prefix.clone(),
            credentials_id: self.credentials.clone(),
            run_tests: self.run_tests.then_some(true),
            keep_running: self.keep_running,
            build_number: self.build_number.clone(),
            revision: self.revision.clone(),
            branch: self.branch.clone(),
            ..Settings::default()
        }
    }

    fn workspace(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }

    fn backend(&self) -> ShellBackend {
        match self.shell {
            Some(BackendArg::Posix) => ShellBackend::Posix,
            Some(BackendArg::Powershell) => ShellBackend::PowerShell,
            None => ShellBackend::detect(),
        }
    }

    fn load_settings(&self, workspace: &std::path::Path) -> Result<Settings, PipelineError> {
        let file = match &self.config {
            Some(path) => Some(path.clone()),
            None => Some(workspace.join(DEFAULT_SETTINGS_FILE)).filter(|p| p.is_file()),
        };
        let base = match file {
            Some(path) => Settings::load(&path)?,
            None => Settings::default(),
        };
        Ok(base.merge(self.overrides()))
    }

    /// Loads settings, reads the environment and resolves the configuration.
    ///
    /// A settings or resolution failure is kept in [`Invocation::config`] so
    /// that `run` can still tear down.
    pub fn prepare(&self, streaming: bool) -> Result<Invocation> {
        let workspace = self.workspace()?;
        let executor = LocalExecutor::new()
            .with_cwd(&workspace)
            .with_backend(self.backend())
            .streaming(streaming);

        let (settings, config) = match self.load_settings(&workspace) {
            Ok(settings) => {
                let mut env: HashMap<String, String> = std::env::vars().collect();
                if settings.revision.is_none() && !env.contains_key("GIT_COMMIT") {
                    if let Some(revision) = detect_revision(&executor) {
                        env.insert("GIT_COMMIT".to_string(), revision);
                    }
                }
                let config = resolve(&settings, &env, workspace.clone());
                (settings, config)
            }
            Err(err) => (Settings::default(), Err(err)),
        };

        Ok(Invocation {
            settings,
            workspace,
            executor,
            config,
        })
    }
}

/// Asks git for the checked-out revision
fn detect_revision(executor: &LocalExecutor) -> Option<String> {
    let env = Environment::new();
    match executor.run(&CommandRequest::new("git rev-parse HEAD", &env).quiet()) {
        Ok(result) if result.is_success() && !result.stdout.trim().is_empty() => {
            let revision = result.stdout.trim().to_string();
            tracing::debug!(revision = %revision, "Revision detected from git");
            Some(revision)
        }
        Ok(result) => {
            tracing::warn!(exit_code = result.exit_code, "git could not report the revision");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "git could not be started");
            None
        }
    }
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Parse and execute CLI arguments
pub fn run(cancel: CancelToken) -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(if args.verbose { "debug" } else { "info" });

    match args.command {
        Command::Run { params, json } => {
            let success = run::run_pipeline(&params, json, cancel)?;
            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Plan { params, json } => {
            plan::plan_pipeline(&params, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let args = Args::try_parse_from([
            "stackci",
            "run",
            "--registry",
            "registry.example.com",
            "--credentials",
            "registry-creds",
            "--run-tests",
            "--keep-running",
            "false",
            "--shell",
            "posix",
        ])
        .unwrap();

        let Command::Run { params, json } = args.command else {
            panic!("expected run");
        };
        assert!(!json);
        let overrides = params.overrides();
        assert_eq!(overrides.registry.as_deref(), Some("registry.example.com"));
        assert_eq!(overrides.credentials_id.as_deref(), Some("registry-creds"));
        assert_eq!(overrides.run_tests, Some(true));
        assert_eq!(overrides.keep_running, Some(false));
        assert_eq!(params.backend(), ShellBackend::Posix);
    }

    #[test]
    fn test_unset_flags_do_not_override() {
        let args = Args::try_parse_from(["stackci", "plan"]).unwrap();
        let Command::Plan { params, .. } = args.command else {
            panic!("expected plan");
        };
        assert_eq!(params.overrides(), Settings::default());
    }

    #[test]
    fn test_settings_file_in_workspace_is_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_SETTINGS_FILE),
            "image_prefix: shop\nregistry: file.example.com\n",
        )
        .unwrap();

        let params = ParamArgs {
            registry: Some("cli.example.com".to_string()),
            ..ParamArgs::default()
        };
        let settings = params.load_settings(dir.path()).unwrap();

        assert_eq!(settings.image_prefix.as_deref(), Some("shop"));
        assert_eq!(settings.registry.as_deref(), Some("cli.example.com"));
    }

    #[test]
    fn test_prepare_resolves_explicit_revision() {
        let dir = tempfile::tempdir().unwrap();
        let params = ParamArgs {
            build_number: Some("9".to_string()),
            revision: Some("0123456789abcdef".to_string()),
            workspace: Some(dir.path().to_path_buf()),
            ..ParamArgs::default()
        };

        let invocation = params.prepare(false).unwrap();
        assert_eq!(invocation.config.unwrap().image_tag, "9-0123456");
    }

    #[test]
    fn test_prepare_keeps_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_SETTINGS_FILE), "nope: [").unwrap();
        let params = ParamArgs {
            workspace: Some(dir.path().to_path_buf()),
            ..ParamArgs::default()
        };

        let invocation = params.prepare(false).unwrap();
        assert!(matches!(
            invocation.config,
            Err(PipelineError::Configuration(_))
        ));
    }
}
