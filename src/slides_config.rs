// ABOUTME: Configuration merging for mkslides builds
// ABOUTME: Combines default settings with per-request overrides and renders them as YAML

use crate::errors::{Result, SlidesError};
use crate::request::{json_type_name, non_empty, BuildRequest};
use log::{debug, info};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

pub const SLIDES_SECTION: &str = "slides";
pub const REVEALJS_SECTION: &str = "revealjs";

/// Baseline configuration that every request starts from.
///
/// Treated as an immutable value; the server holds one copy and tests can
/// build their own.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDefaults {
    document: Map<String, Value>,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        let mut document = Map::new();
        document.insert(
            SLIDES_SECTION.to_string(),
            json!({
                "theme": "black",
                "highlight_theme": "monokai",
            }),
        );
        document.insert(
            REVEALJS_SECTION.to_string(),
            json!({
                "history": true,
                "slideNumber": "c/t",
            }),
        );
        Self { document }
    }
}

impl ConfigDefaults {
    /// Use an arbitrary mapping as the defaults
    pub fn from_document(document: Value) -> Result<Self> {
        match document {
            Value::Object(document) => Ok(Self { document }),
            other => Err(SlidesError::ConfigError(format!(
                "default configuration must be a mapping, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Load defaults from a YAML file in the mkslides config format
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("[Setup] Loading default configuration from {:?}", path);
        let text = fs::read_to_string(path).map_err(|e| {
            SlidesError::ConfigError(format!("Failed to read defaults file {:?}: {}", path, e))
        })?;
        let document: Value = serde_yaml_ng::from_str(&text).map_err(|e| {
            SlidesError::ConfigError(format!("Failed to parse defaults file {:?}: {}", path, e))
        })?;
        Self::from_document(document)
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }
}

/// Configuration document handed to a single mkslides build
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    document: Map<String, Value>,
}

impl EffectiveConfig {
    /// Resolve the configuration for `request`.
    ///
    /// A non-empty `config_override` replaces everything. Otherwise the
    /// defaults are copied and the named overrides are written over them;
    /// `revealjs_options` is merged one key at a time.
    pub fn resolve(defaults: &ConfigDefaults, request: &BuildRequest) -> Result<Self> {
        request.validate()?;

        if let Some(document) = request.effective_override() {
            if request.has_named_overrides() {
                info!("[Setup] config_override present, ignoring theme and revealjs overrides");
            }
            debug!("[Setup] Using caller-supplied configuration verbatim");
            return Ok(Self {
                document: document.clone(),
            });
        }

        let mut document = defaults.document.clone();

        if let Some(theme) = non_empty(&request.slides_theme) {
            info!("[Setup] Setting slides theme: {}", theme);
            section_mut(&mut document, SLIDES_SECTION)?
                .insert("theme".to_string(), Value::String(theme.to_string()));
        }

        if let Some(theme) = non_empty(&request.slides_highlight_theme) {
            info!("[Setup] Setting slides highlight theme: {}", theme);
            section_mut(&mut document, SLIDES_SECTION)?
                .insert("highlight_theme".to_string(), Value::String(theme.to_string()));
        }

        if let Some(options) = request.revealjs_options.as_ref().and_then(Value::as_object) {
            if !options.is_empty() {
                info!("[Setup] Setting Reveal.js options: {}", Value::Object(options.clone()));
                let revealjs = section_mut(&mut document, REVEALJS_SECTION)?;
                for (key, value) in options {
                    revealjs.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(Self { document })
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn theme(&self) -> Option<&str> {
        self.slides_value("theme")
    }

    pub fn highlight_theme(&self) -> Option<&str> {
        self.slides_value("highlight_theme")
    }

    pub fn revealjs(&self) -> Option<&Map<String, Value>> {
        self.document.get(REVEALJS_SECTION).and_then(Value::as_object)
    }

    fn slides_value(&self, key: &str) -> Option<&str> {
        self.document
            .get(SLIDES_SECTION)
            .and_then(|slides| slides.get(key))
            .and_then(Value::as_str)
    }

    /// Render the document in the YAML format mkslides reads with `-f`
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(&self.document)?)
    }
}

/// Get a mutable top-level section, creating it when absent
fn section_mut<'a>(document: &'a mut Map<String, Value>, name: &str) -> Result<&'a mut Map<String, Value>> {
    let section = document
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));

    if section.is_null() {
        *section = Value::Object(Map::new());
    }

    let kind = json_type_name(section);
    section.as_object_mut().ok_or_else(|| {
        SlidesError::ValidationError(format!(
            "configuration section '{}' must be a mapping, got {}",
            name, kind
        ))
    })
}
