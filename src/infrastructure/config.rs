//! Configuration management
//!
//! Raw invocation parameters, read from an optional YAML settings file and
//! overridden by command-line flags. Defaults are applied later by
//! [`crate::pipeline::resolve`].

use crate::pipeline::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default settings file name, looked up in the workspace
pub const DEFAULT_SETTINGS_FILE: &str = "stackci.yaml";

/// Readiness check parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSettings {
    /// Container whose health status is polled
    pub container: Option<String>,
    /// URL expected to answer `200`
    pub url: Option<String>,
    /// Attempts for each check
    pub attempts: Option<u32>,
    /// Seconds between container health attempts
    pub health_delay_secs: Option<u64>,
    /// Seconds between HTTP attempts
    pub http_delay_secs: Option<u64>,
}

/// Raw, unresolved invocation parameters. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Registry endpoint; empty disables publishing
    pub registry: Option<String>,
    /// Image name prefix
    pub image_prefix: Option<String>,
    /// Credentials reference; empty disables publishing
    pub credentials_id: Option<String>,
    /// Run the test suite instead of packaging only
    pub run_tests: Option<bool>,
    /// Leave the stack running after the pipeline
    pub keep_running: Option<bool>,
    /// Build counter, normally from `BUILD_NUMBER`
    pub build_number: Option<String>,
    /// Source revision, normally from `GIT_COMMIT`
    pub revision: Option<String>,
    /// Branch name, normally from `BRANCH_NAME`
    pub branch: Option<String>,
    /// Branches that also publish the floating tag
    pub release_branches: Option<Vec<String>>,
    /// Backend source directory
    pub backend_dir: Option<String>,
    /// Frontend source directory
    pub frontend_dir: Option<String>,
    /// Compose project name
    pub compose_project: Option<String>,
    /// Compose file path
    pub compose_file: Option<String>,
    /// Readiness checks
    pub readiness: ReadinessSettings,
}

impl Settings {
    /// Parses settings from YAML
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] on malformed YAML or unknown keys.
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::Configuration(format!("invalid settings: {e}")))
    }

    /// Loads settings from a file
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
        Self::from_yaml(&text)
    }

    /// Layers `overrides` on top of `self`; set fields of `overrides` win
    #[must_use]
    pub fn merge(self, overrides: Settings) -> Self {
        Self {
            registry: overrides.registry.or(self.registry),
            image_prefix: overrides.image_prefix.or(self.image_prefix),
            credentials_id: overrides.credentials_id.or(self.credentials_id),
            run_tests: overrides.run_tests.or(self.run_tests),
            keep_running: overrides.keep_running.or(self.keep_running),
            build_number: overrides.build_number.or(self.build_number),
            revision: overrides.revision.or(self.revision),
            branch: overrides.branch.or(self.branch),
            release_branches: overrides.release_branches.or(self.release_branches),
            backend_dir: overrides.backend_dir.or(self.backend_dir),
            frontend_dir: overrides.frontend_dir.or(self.frontend_dir),
            compose_project: overrides.compose_project.or(self.compose_project),
            compose_file: overrides.compose_file.or(self.compose_file),
            readiness: ReadinessSettings {
                container: overrides.readiness.container.or(self.readiness.container),
                url: overrides.readiness.url.or(self.readiness.url),
                attempts: overrides.readiness.attempts.or(self.readiness.attempts),
                health_delay_secs: overrides
                    .readiness
                    .health_delay_secs
                    .or(self.readiness.health_delay_secs),
                http_delay_secs: overrides
                    .readiness
                    .http_delay_secs
                    .or(self.readiness.http_delay_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_settings_default_is_empty() {
        let settings = Settings::default();
        assert!(settings.registry.is_none());
        assert!(settings.readiness.attempts.is_none());
    }

    #[test]
    fn test_settings_from_yaml() {
        let yaml = r"
registry: registry.example.com
image_prefix: shop
run_tests: true
release_branches: [main]
readiness:
  url: http://localhost:8080/health
  attempts: 6
";
        let settings = Settings::from_yaml(yaml).unwrap();

        assert_eq!(settings.registry.as_deref(), Some("registry.example.com"));
        assert_eq!(settings.image_prefix.as_deref(), Some("shop"));
        assert_eq!(settings.run_tests, Some(true));
        assert_eq!(settings.release_branches, Some(vec!["main".to_string()]));
        assert_eq!(settings.readiness.attempts, Some(6));
    }

    #[test]
    fn test_settings_rejects_unknown_keys() {
        let err = Settings::from_yaml("registy: typo\n").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_settings_empty_yaml() {
        assert_eq!(Settings::from_yaml("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = Settings {
            registry: Some("file.example.com".to_string()),
            image_prefix: Some("shop".to_string()),
            ..Settings::default()
        };
        let cli = Settings {
            registry: Some(String::new()),
            run_tests: Some(true),
            ..Settings::default()
        };

        let merged = file.merge(cli);

        assert_eq!(merged.registry.as_deref(), Some(""));
        assert_eq!(merged.image_prefix.as_deref(), Some("shop"));
        assert_eq!(merged.run_tests, Some(true));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, "keep_running: false\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.keep_running, Some(false));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
