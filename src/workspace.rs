// ABOUTME: Ephemeral workspace handling for mkslides builds
// ABOUTME: Creates a unique temp directory per request and removes it on every exit path

use crate::errors::{Result, SlidesError};
use crate::slides_config::EffectiveConfig;
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const WORKSPACE_PREFIX: &str = "mkslides-";
pub const MARKDOWN_FILE: &str = "slides.md";
pub const CONFIG_FILE: &str = "mkslides.yml";

/// A uniquely-named directory owned by one request.
///
/// The directory is removed when the value is dropped, so a `Workspace` held
/// on the stack is cleaned up on success, early return and panic alike. Use
/// [`Workspace::release`] to observe removal errors.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a new, empty workspace directory under `root`
    pub fn acquire(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .map_err(|e| SlidesError::workspace(root, "Failed to create workspace root", e))?;

        let path = root.join(format!("{}{}", WORKSPACE_PREFIX, uuid::Uuid::new_v4()));

        // create_dir fails if the name is already taken
        fs::create_dir(&path)
            .map_err(|e| SlidesError::workspace(&path, "Failed to create workspace directory", e))?;

        info!("[Setup] Created workspace: {:?}", path);
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn markdown_path(&self) -> PathBuf {
        self.path.join(MARKDOWN_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE)
    }

    /// Write the Markdown source; fails if the file already exists
    pub fn write_markdown(&self, content: &str) -> Result<PathBuf> {
        let path = self.markdown_path();
        write_new_file(&path, content.as_bytes())?;
        info!("[Setup] Wrote markdown file: {:?} ({} bytes)", path, content.len());
        Ok(path)
    }

    /// Serialize and write the build configuration; fails if the file already exists
    pub fn write_config(&self, config: &EffectiveConfig) -> Result<PathBuf> {
        let yaml = config.to_yaml()?;
        let path = self.config_path();
        write_new_file(&path, yaml.as_bytes())?;
        info!("[Setup] Wrote config file: {:?}", path);
        log::debug!("[Setup] Config content:\n{}", yaml);
        Ok(path)
    }

    /// Remove the workspace and everything in it
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_tree(&self.path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_tree(&self.path) {
            warn!("Failed to clean up workspace: {}", e);
        }
    }
}

fn write_new_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| SlidesError::workspace(path, "Failed to create file", e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| SlidesError::workspace(path, "Failed to write file", e))
}

fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!("[Setup] Cleaned up workspace: {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SlidesError::workspace(path, "Failed to remove workspace", e)),
    }
}
