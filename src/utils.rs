// ABOUTME: Utility functions for the mkslides-server application
// ABOUTME: Provides path resolution and output directory preparation helpers

use crate::errors::{Result, SlidesError};
use log::warn;
use std::path::{Component, Path, PathBuf};

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .map_err(|e| SlidesError::workspace(path, "Failed to create output directory", e))?;
    } else if !path.is_dir() {
        return Err(SlidesError::ValidationError(format!(
            "Path exists but is not a directory: {:?}",
            path
        )));
    }
    Ok(())
}

/// Validate write permissions for a directory
pub fn validate_directory_writable(path: &Path) -> Result<()> {
    ensure_directory_exists(path)?;

    let test_file = path.join(format!(".mkslides_write_test_{}.tmp", uuid::Uuid::new_v4()));
    match std::fs::File::create(&test_file) {
        Ok(_) => {
            if let Err(e) = std::fs::remove_file(&test_file) {
                warn!("Failed to clean up test file {:?}: {}", test_file, e);
            }
            Ok(())
        }
        Err(e) => Err(SlidesError::workspace(path, "Directory is not writable", e)),
    }
}

/// Resolve `path` against the current working directory without requiring it to exist
pub fn get_absolute_path(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| SlidesError::InternalError {
            message: "Failed to read current directory".to_string(),
            source: Some(Box::new(e)),
        })?;
        cwd.join(path)
    };
    Ok(normalize(&joined))
}

/// Drop `.` components and fold `..` lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve, create and check the directory a build will write into
pub fn prepare_output_dir(path: &Path) -> Result<PathBuf> {
    let absolute = get_absolute_path(path)?;
    validate_directory_writable(&absolute)?;
    Ok(absolute)
}
