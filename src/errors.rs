// ABOUTME: Error types for the mkslides-server application
// ABOUTME: Provides structured error handling for each stage of the build pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlidesError {
    #[error("Input validation error: {0}")]
    ValidationError(String),

    #[error("Workspace error at {path:?}: {message}")]
    WorkspaceError {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("mkslides build failed with exit code {exit_code:?}")]
    BuildFailure { exit_code: Option<i32> },

    #[error("mkslides build timed out after {0} ms")]
    TimeoutError(u64),

    #[error("mkslides build was cancelled")]
    Cancelled,

    #[error("'{0}' command not found. Is it installed and in the PATH?")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] serde_yaml_ng::Error),

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SlidesError {
    /// Build a workspace error from an I/O failure at `path`
    pub fn workspace(path: impl Into<PathBuf>, message: impl Into<String>, err: std::io::Error) -> Self {
        SlidesError::WorkspaceError {
            path: path.into(),
            message: message.into(),
            source: Some(err),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SlidesError::InternalError {
            message: message.into(),
            source: None,
        }
    }

    /// Stable machine-readable name reported to protocol clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            SlidesError::ValidationError(_) => ErrorKind::Validation,
            SlidesError::WorkspaceError { .. } => ErrorKind::Workspace,
            SlidesError::BuildFailure { .. } => ErrorKind::Build,
            SlidesError::TimeoutError(_) => ErrorKind::Timeout,
            SlidesError::Cancelled => ErrorKind::Cancelled,
            SlidesError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            SlidesError::ConfigError(_)
            | SlidesError::SerializeError(_)
            | SlidesError::InternalError { .. } => ErrorKind::Internal,
        }
    }
}

/// Failure categories surfaced in a `BuildResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Workspace,
    Build,
    Timeout,
    Cancelled,
    ToolNotFound,
    Internal,
}

impl From<serde_json::Error> for SlidesError {
    fn from(err: serde_json::Error) -> Self {
        SlidesError::ValidationError(format!("Malformed request: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, SlidesError>;
