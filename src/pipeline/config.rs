//! Resolved run-time configuration
//!
//! [`resolve`] turns raw [`Settings`] plus the process environment into an
//! immutable [`PipelineConfig`], applying defaults and deriving the
//! composite image tag `<build-counter>-<7-char-revision>`.

use super::Environment;
use super::errors::PipelineError;
use crate::infrastructure::config::Settings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Reserved readiness timeout, not consulted by any stage
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_IMAGE_PREFIX: &str = "webapp";
const DEFAULT_BACKEND_DIR: &str = "backend";
const DEFAULT_FRONTEND_DIR: &str = "frontend";
const DEFAULT_COMPOSE_PROJECT: &str = "webapp-ci";
const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
const DEFAULT_RELEASE_BRANCHES: [&str; 2] = ["main", "master"];
const DEFAULT_READINESS_URL: &str = "http://localhost:8080/";
const DEFAULT_READINESS_ATTEMPTS: u32 = 12;
const DEFAULT_HEALTH_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_HTTP_DELAY: Duration = Duration::from_secs(5);
const SHORT_REVISION_LEN: usize = 7;

static REVISION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{7,40}$").unwrap_or_else(|e| panic!("revision pattern: {e}"))
});

static BUILD_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap_or_else(|e| panic!("build number pattern: {e}")));

/// Where the two services and their compose stack live.
///
/// Known before the configuration is resolved, so teardown can use it
/// even when resolution fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLayout {
    /// Backend source directory
    pub backend_dir: String,
    /// Frontend source directory
    pub frontend_dir: String,
    /// Compose project name
    pub compose_project: String,
    /// Compose file path
    pub compose_file: String,
}

impl StackLayout {
    /// Applies defaults to the layout fields of `settings`
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            backend_dir: non_empty_or(settings.backend_dir.as_deref(), DEFAULT_BACKEND_DIR),
            frontend_dir: non_empty_or(settings.frontend_dir.as_deref(), DEFAULT_FRONTEND_DIR),
            compose_project: non_empty_or(
                settings.compose_project.as_deref(),
                DEFAULT_COMPOSE_PROJECT,
            ),
            compose_file: non_empty_or(settings.compose_file.as_deref(), DEFAULT_COMPOSE_FILE),
        }
    }

    /// Variables describing the layout
    #[must_use]
    pub fn variables(&self) -> Environment {
        Environment::new()
            .set("BACKEND_DIR", &self.backend_dir)
            .set("FRONTEND_DIR", &self.frontend_dir)
            .set("COMPOSE_PROJECT", &self.compose_project)
            .set("COMPOSE_FILE", &self.compose_file)
    }
}

/// Readiness check parameters with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// Container whose health status must become `healthy`
    pub container: String,
    /// URL that must answer `200`
    pub url: String,
    /// Attempts for each check
    pub attempts: u32,
    /// Delay between container health attempts
    pub health_delay: Duration,
    /// Delay between HTTP attempts
    pub http_delay: Duration,
}

impl ReadinessConfig {
    /// Applies defaults to the readiness fields of `settings`
    #[must_use]
    pub fn from_settings(settings: &Settings, layout: &StackLayout) -> Self {
        let readiness = &settings.readiness;
        Self {
            container: readiness
                .container
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| format!("{}-backend-1", layout.compose_project)),
            url: non_empty_or(readiness.url.as_deref(), DEFAULT_READINESS_URL),
            attempts: readiness.attempts.unwrap_or(DEFAULT_READINESS_ATTEMPTS),
            health_delay: readiness
                .health_delay_secs
                .map_or(DEFAULT_HEALTH_DELAY, Duration::from_secs),
            http_delay: readiness
                .http_delay_secs
                .map_or(DEFAULT_HTTP_DELAY, Duration::from_secs),
        }
    }
}

/// Registry login secrets looked up from the credentials reference
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RegistryCredentials {
    /// Registry user
    pub username: String,
    /// Registry password or token
    pub password: String,
}

impl RegistryCredentials {
    /// Looks up `<ID>_USR` and `<ID>_PSW` in `env`, where `<ID>` is the
    /// credentials reference upper-cased with non-alphanumerics as `_`.
    /// Falls back to `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`. Empty
    /// values count as missing.
    #[must_use]
    pub fn lookup(credentials_id: &str, env: &HashMap<String, String>) -> Option<Self> {
        let prefix = secret_prefix(credentials_id);
        let pair = |user: &str, password: &str| {
            let username = env.get(user).filter(|v| !v.is_empty())?;
            let password = env.get(password).filter(|v| !v.is_empty())?;
            Some(Self {
                username: username.clone(),
                password: password.clone(),
            })
        };

        pair(&format!("{prefix}_USR"), &format!("{prefix}_PSW"))
            .or_else(|| pair("REGISTRY_USERNAME", "REGISTRY_PASSWORD"))
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration of one run. Created once by [`resolve`], never mutated
/// by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Registry endpoint without scheme; empty disables publishing
    pub registry: String,
    /// Image name prefix
    pub image_prefix: String,
    /// Credentials reference; empty disables publishing
    pub credentials_id: String,
    /// Registry secrets; present whenever publishing is active
    pub credentials: Option<RegistryCredentials>,
    /// Run the full test suite instead of packaging only
    pub run_tests: bool,
    /// Leave the stack running after the pipeline
    pub keep_running: bool,
    /// Reserved readiness timeout
    pub readiness_timeout: Duration,
    /// Build counter
    pub build_number: String,
    /// Short source revision
    pub revision: String,
    /// Composite image tag
    pub image_tag: String,
    /// Branch being built; may be empty
    pub branch: String,
    /// Branches that publish the floating tag
    pub release_branches: Vec<String>,
    /// Source and stack layout
    pub layout: StackLayout,
    /// Readiness checks
    pub readiness: ReadinessConfig,
    /// Workspace root
    pub workspace: PathBuf,
}

impl PipelineConfig {
    /// Backend image name without registry or tag
    #[must_use]
    pub fn backend_image(&self) -> String {
        format!("{}-backend", self.image_prefix)
    }

    /// Frontend image name without registry or tag
    #[must_use]
    pub fn frontend_image(&self) -> String {
        format!("{}-frontend", self.image_prefix)
    }

    /// True when both a registry and a credentials reference are set
    #[must_use]
    pub fn publishes(&self) -> bool {
        !self.registry.is_empty() && !self.credentials_id.is_empty()
    }

    /// Variables substituted into commands and exported to them.
    ///
    /// Never contains the registry password; see [`secrets`][Self::secrets].
    #[must_use]
    pub fn variables(&self) -> Environment {
        let username = self
            .credentials
            .as_ref()
            .map(|c| c.username.clone())
            .unwrap_or_default();
        self.layout
            .variables()
            .set("REGISTRY", &self.registry)
            .set("IMAGE_PREFIX", &self.image_prefix)
            .set("CREDENTIALS_ID", &self.credentials_id)
            .set("REGISTRY_USERNAME", username)
            .set("BUILD_NUMBER", &self.build_number)
            .set("GIT_COMMIT_SHORT", &self.revision)
            .set("IMAGE_TAG", &self.image_tag)
            .set("BRANCH_NAME", &self.branch)
            .set("BACKEND_IMAGE", self.backend_image())
            .set("FRONTEND_IMAGE", self.frontend_image())
            .set("RUN_TESTS", self.run_tests.to_string())
            .set("KEEP_RUNNING", self.keep_running.to_string())
            .set("READINESS_TIMEOUT", self.readiness_timeout.as_secs().to_string())
            .set("HEALTH_CONTAINER", &self.readiness.container)
            .set("HEALTH_URL", &self.readiness.url)
    }

    /// Values that may only be substituted into a step's stdin.
    ///
    /// They are neither exported to commands nor expanded in command lines.
    #[must_use]
    pub fn secrets(&self) -> Environment {
        match &self.credentials {
            Some(credentials) => {
                Environment::new().set("REGISTRY_PASSWORD", &credentials.password)
            }
            None => Environment::new(),
        }
    }
}

/// Resolves raw settings and environment into a [`PipelineConfig`].
///
/// Settings take precedence over `BUILD_NUMBER`, `GIT_COMMIT` and
/// `BRANCH_NAME`/`GIT_BRANCH` from `env`.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] when the build counter or the
/// revision is missing or malformed, when the readiness URL or the
/// registry endpoint is not a valid URL, or when publishing is active and
/// no registry secrets resolve.
pub fn resolve(
    settings: &Settings,
    env: &HashMap<String, String>,
    workspace: impl Into<PathBuf>,
) -> Result<PipelineConfig, PipelineError> {
    let build_number = pick(settings.build_number.as_deref(), env, &["BUILD_NUMBER"])
        .ok_or_else(|| PipelineError::Configuration("build counter is not set".to_string()))?;
    if !BUILD_NUMBER_PATTERN.is_match(&build_number) {
        return Err(PipelineError::Configuration(format!(
            "build counter '{build_number}' is not a number"
        )));
    }

    let revision = pick(settings.revision.as_deref(), env, &["GIT_COMMIT"]).ok_or_else(|| {
        PipelineError::Configuration("source revision hash is not available".to_string())
    })?;
    if !REVISION_PATTERN.is_match(&revision) {
        return Err(PipelineError::Configuration(format!(
            "source revision '{revision}' is not a commit hash"
        )));
    }
    let revision = revision[..SHORT_REVISION_LEN].to_ascii_lowercase();

    let branch = pick(settings.branch.as_deref(), env, &["BRANCH_NAME", "GIT_BRANCH"])
        .map(|b| b.strip_prefix("origin/").map(str::to_string).unwrap_or(b))
        .unwrap_or_default();

    let registry = normalize_registry(settings.registry.as_deref().unwrap_or_default())?;
    let credentials_id = settings
        .credentials_id
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();
    let credentials = if registry.is_empty() || credentials_id.is_empty() {
        None
    } else {
        Some(
            RegistryCredentials::lookup(&credentials_id, env).ok_or_else(|| {
                let id = secret_prefix(&credentials_id);
                PipelineError::Configuration(format!(
                    "no registry secrets for credentials '{credentials_id}': \
                     set {id}_USR/{id}_PSW or REGISTRY_USERNAME/REGISTRY_PASSWORD"
                ))
            })?,
        )
    };

    let layout = StackLayout::from_settings(settings);
    let readiness = ReadinessConfig::from_settings(settings, &layout);
    url::Url::parse(&readiness.url).map_err(|e| {
        PipelineError::Configuration(format!("readiness URL '{}' is invalid: {e}", readiness.url))
    })?;

    let image_tag = format!("{build_number}-{revision}");
    let config = PipelineConfig {
        registry,
        image_prefix: non_empty_or(settings.image_prefix.as_deref(), DEFAULT_IMAGE_PREFIX),
        credentials_id,
        credentials,
        run_tests: settings.run_tests.unwrap_or(false),
        keep_running: settings.keep_running.unwrap_or(true),
        readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        build_number,
        revision,
        image_tag,
        branch,
        release_branches: settings.release_branches.clone().unwrap_or_else(|| {
            DEFAULT_RELEASE_BRANCHES
                .iter()
                .map(ToString::to_string)
                .collect()
        }),
        layout,
        readiness,
        workspace: workspace.into(),
    };

    tracing::info!(
        image_tag = %config.image_tag,
        branch = %config.branch,
        run_tests = config.run_tests,
        publish = config.publishes(),
        "Resolved pipeline configuration"
    );

    Ok(config)
}

/// Credentials reference upper-cased with non-alphanumerics as `_`
fn secret_prefix(credentials_id: &str) -> String {
    credentials_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn pick(explicit: Option<&str>, env: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    explicit
        .into_iter()
        .chain(keys.iter().filter_map(|k| env.get(*k).map(String::as_str)))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty_or(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Strips scheme and trailing slashes so the endpoint can prefix image names
fn normalize_registry(raw: &str) -> Result<String, PipelineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let parsed = url::Url::parse(&with_scheme).map_err(|e| {
        PipelineError::Configuration(format!("registry endpoint '{raw}' is invalid: {e}"))
    })?;
    let host = parsed.host_str().ok_or_else(|| {
        PipelineError::Configuration(format!("registry endpoint '{raw}' has no host"))
    })?;

    let mut endpoint = host.to_string();
    if let Some(port) = parsed.port() {
        endpoint.push_str(&format!(":{port}"));
    }
    let path = parsed.path().trim_end_matches('/');
    endpoint.push_str(path);
    Ok(endpoint)
}
