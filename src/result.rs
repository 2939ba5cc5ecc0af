// ABOUTME: Result translation for mkslides builds
// ABOUTME: Turns subprocess outcomes and pipeline errors into structured BuildResult values

use crate::errors::{ErrorKind, Result, SlidesError};
use crate::invoker::{ExitOutcome, ProcessOutput};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Failure details attached to an unsuccessful `BuildResult`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one `generate_slides` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Absolute paths, sorted. Empty unless `success`.
    pub output_files: Vec<PathBuf>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BuildError>,
}

impl BuildResult {
    /// A failure that happened before or around the subprocess
    pub fn from_error(err: &SlidesError, output_dir: Option<&Path>) -> Self {
        let exit_code = match err {
            SlidesError::BuildFailure { exit_code } => *exit_code,
            _ => None,
        };

        Self {
            success: false,
            output_dir: output_dir.map(Path::to_path_buf),
            output_files: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
            duration_ms: 0,
            error: Some(BuildError {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Path of the generated index page, if the build produced one
    pub fn index_html(&self) -> Option<&Path> {
        let dir = self.output_dir.as_deref()?;
        self.output_files
            .iter()
            .find(|path| path.parent() == Some(dir) && path.file_name().map_or(false, |n| n == "index.html"))
            .map(PathBuf::as_path)
    }
}

/// Map a finished subprocess onto a `BuildResult`.
///
/// Tool output is passed through untouched.
pub fn translate(output: ProcessOutput, output_dir: &Path, timeout: Duration) -> Result<BuildResult> {
    let duration_ms = output.duration.as_millis() as u64;
    let exit_code = output.exit_code();

    let failure = match output.outcome {
        ExitOutcome::Exited(0) => None,
        ExitOutcome::Exited(_) | ExitOutcome::Signaled => Some(SlidesError::BuildFailure { exit_code }),
        ExitOutcome::TimedOut => Some(SlidesError::TimeoutError(timeout.as_millis() as u64)),
        ExitOutcome::Cancelled => Some(SlidesError::Cancelled),
    };

    if let Some(err) = failure {
        error!("[Error] {}", err);
        if !output.stdout.is_empty() {
            error!("[Error] stdout:\n{}", output.stdout);
        }
        if !output.stderr.is_empty() {
            error!("[Error] stderr:\n{}", output.stderr);
        }
        return Ok(BuildResult {
            success: false,
            output_dir: Some(output_dir.to_path_buf()),
            output_files: Vec::new(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
            duration_ms,
            error: Some(BuildError {
                kind: err.kind(),
                message: err.to_string(),
            }),
        });
    }

    info!("[API] mkslides build stdout:\n{}", output.stdout);
    if !output.stderr.is_empty() {
        warn!("[API] mkslides build stderr:\n{}", output.stderr);
    }

    let output_files = list_output_files(output_dir)?;
    info!(
        "[API] mkslides build completed successfully in {} ms, {} files in {:?}",
        duration_ms,
        output_files.len(),
        output_dir
    );

    Ok(BuildResult {
        success: true,
        output_dir: Some(output_dir.to_path_buf()),
        output_files,
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code,
        duration_ms,
        error: None,
    })
}

/// Every regular file below `dir`, sorted
pub fn list_output_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&dir.to_string_lossy())
    );

    let entries = glob::glob(&pattern)
        .map_err(|e| SlidesError::internal(format!("Invalid output pattern {}: {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable output entry: {}", e),
        }
    }
    files.sort();
    Ok(files)
}
