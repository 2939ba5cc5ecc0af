// ABOUTME: Configuration module for the mkslides-server application
// ABOUTME: Provides server settings and environment variable handling

use crate::errors::{Result, SlidesError};
use crate::slides_config::ConfigDefaults;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MKSLIDES_BIN: &str = "mkslides";
pub const DEFAULT_OUTPUT_DIR: &str = "./mkslides_output";
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Settings shared by every request handled by one server process
#[derive(Debug, Clone)]
pub struct Config {
    /// Name or path of the mkslides executable
    pub mkslides_bin: String,
    /// Output directory used when a request does not name one
    pub default_output_dir: PathBuf,
    pub timeout_ms: u64,
    /// Parent directory for per-request workspaces
    pub temp_root: PathBuf,
    /// Directory holding README.md and docs/creating_slides.md; the bundled copies are used when unset
    pub docs_dir: Option<PathBuf>,
    pub defaults: ConfigDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mkslides_bin: DEFAULT_MKSLIDES_BIN.to_string(),
            default_output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            temp_root: env::temp_dir(),
            docs_dir: None,
            defaults: ConfigDefaults::default(),
        }
    }
}

impl Config {
    /// Create a new configuration instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(bin) = env::var("MKSLIDES_BIN") {
            if !bin.is_empty() {
                config.mkslides_bin = bin;
            }
        }
        if let Ok(dir) = env::var("MKSLIDES_OUTPUT_DIR") {
            config.default_output_dir = PathBuf::from(dir);
        }
        if let Ok(timeout) = env::var("MKSLIDES_TIMEOUT_MS") {
            config.timeout_ms = timeout.parse::<u64>().map_err(|e| {
                SlidesError::ConfigError(format!(
                    "MKSLIDES_TIMEOUT_MS must be a number of milliseconds, got {:?}: {}",
                    timeout, e
                ))
            })?;
        }
        if let Ok(dir) = env::var("MKSLIDES_TEMP_DIR") {
            config.temp_root = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("MKSLIDES_DOCS_DIR") {
            config.docs_dir = Some(PathBuf::from(dir));
        }
        if let Ok(path) = env::var("MKSLIDES_DEFAULTS") {
            config.defaults = ConfigDefaults::from_file(&PathBuf::from(path))?;
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_mkslides_bin(mut self, bin: impl Into<String>) -> Self {
        self.mkslides_bin = bin.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn with_docs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.docs_dir = Some(dir.into());
        self
    }

    pub fn with_defaults(mut self, defaults: ConfigDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}
