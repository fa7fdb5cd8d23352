//! Build artifact archiving
//!
//! Copies files matched by a glob into the run's artifact directory.

use crate::pipeline::PipelineError;
use std::path::{Path, PathBuf};

/// Copies every file matching `pattern` (relative to `workspace`) into `dest`.
///
/// Returns the archived paths inside `dest`.
///
/// # Errors
///
/// Returns [`PipelineError::Archive`] on an invalid pattern, or when nothing
/// matches and `allow_empty` is false. Copy failures are
/// [`PipelineError::Io`].
pub fn archive_artifacts(
    workspace: &Path,
    pattern: &str,
    dest: &Path,
    allow_empty: bool,
) -> Result<Vec<PathBuf>, PipelineError> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        workspace.join(pattern).to_string_lossy().to_string()
    };

    let matches: Vec<PathBuf> = glob::glob(&full_pattern)
        .map_err(|e| PipelineError::Archive(format!("invalid pattern '{pattern}': {e}")))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();

    if matches.is_empty() {
        if allow_empty {
            tracing::info!(pattern = %pattern, "No artifacts matched, nothing archived");
            return Ok(Vec::new());
        }
        return Err(PipelineError::Archive(format!(
            "no files match '{pattern}'"
        )));
    }

    std::fs::create_dir_all(dest)?;

    let mut archived = Vec::with_capacity(matches.len());
    for path in matches {
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = dest.join(name);
        std::fs::copy(&path, &target)?;
        tracing::info!(artifact = %path.display(), dest = %target.display(), "Archived artifact");
        archived.push(target);
    }

    Ok(archived)
}
