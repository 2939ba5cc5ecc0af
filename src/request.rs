// ABOUTME: Request types for the generate_slides operation
// ABOUTME: Deserializes tool arguments and validates them before any file I/O

use crate::errors::{Result, SlidesError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One call to `generate_slides`.
///
/// Optional string overrides that are empty are treated as absent, and an
/// empty `config_override` mapping does not replace the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    pub markdown_content: String,

    /// Falls back to the server's default output directory
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Full replacement for the generated configuration document
    #[serde(default)]
    pub config_override: Option<Value>,

    #[serde(default)]
    pub slides_theme: Option<String>,

    #[serde(default)]
    pub slides_highlight_theme: Option<String>,

    /// Reveal.js options merged key by key over the defaults
    #[serde(default)]
    pub revealjs_options: Option<Value>,

    #[serde(default)]
    pub strict: bool,
}

impl BuildRequest {
    pub fn new(markdown_content: impl Into<String>) -> Self {
        Self {
            markdown_content: markdown_content.into(),
            ..Self::default()
        }
    }

    /// Parse a request from the JSON arguments of a tool call
    pub fn from_json(arguments: Value) -> Result<Self> {
        Ok(serde_json::from_value(arguments)?)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.slides_theme = Some(theme.into());
        self
    }

    pub fn with_highlight_theme(mut self, theme: impl Into<String>) -> Self {
        self.slides_highlight_theme = Some(theme.into());
        self
    }

    pub fn with_revealjs_options(mut self, options: Value) -> Self {
        self.revealjs_options = Some(options);
        self
    }

    pub fn with_config_override(mut self, config: Value) -> Self {
        self.config_override = Some(config);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check the request shape. Performs no I/O.
    pub fn validate(&self) -> Result<()> {
        if self.markdown_content.trim().is_empty() {
            return Err(SlidesError::ValidationError(
                "markdown_content must be provided.".to_string(),
            ));
        }

        if let Some(options) = &self.revealjs_options {
            if !options.is_object() {
                return Err(SlidesError::ValidationError(format!(
                    "revealjs_options must be a mapping of option names to values, got {}",
                    json_type_name(options)
                )));
            }
        }

        if let Some(config) = &self.config_override {
            if !config.is_object() {
                return Err(SlidesError::ValidationError(format!(
                    "config_override must be a mapping, got {}",
                    json_type_name(config)
                )));
            }
        }

        if let Some(dir) = &self.output_dir {
            if dir.as_os_str().is_empty() {
                return Err(SlidesError::ValidationError(
                    "output_dir must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// The override document, if it should replace the defaults wholesale
    pub fn effective_override(&self) -> Option<&Map<String, Value>> {
        self.config_override
            .as_ref()
            .and_then(Value::as_object)
            .filter(|map| !map.is_empty())
    }

    /// True if any individually-named override is set
    pub fn has_named_overrides(&self) -> bool {
        non_empty(&self.slides_theme).is_some()
            || non_empty(&self.slides_highlight_theme).is_some()
            || self
                .revealjs_options
                .as_ref()
                .and_then(Value::as_object)
                .map_or(false, |map| !map.is_empty())
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
