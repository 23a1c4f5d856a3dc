//! Template resolution and rendering.
//!
//! Resolution order for one part of a message:
//! 1. operator override text, returned verbatim
//! 2. `<root>/<primary_path>`
//! 3. first file (lexicographic) matching `<root>/<fallback_glob>`
//!
//! Files are re-read on every render.

use serde::Serialize;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tracing::debug;

use super::{TemplatePart, TemplateType};
use crate::config::{TemplateOverride, TemplateSettings};
use crate::error::{CourierError, CourierResult};

/// Renders message parts from a template root directory plus configured overrides
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    root: PathBuf,
    overrides: HashMap<TemplateType, TemplateOverride>,
}

impl TemplateRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &TemplateSettings) -> Self {
        Self {
            root: settings.root.clone(),
            overrides: settings.overrides.clone(),
        }
    }

    pub fn with_override(mut self, template_type: TemplateType, text: TemplateOverride) -> Self {
        self.overrides.insert(template_type, text);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render one part of a message kind using the standard file convention.
    pub fn render_part<M: Serialize + ?Sized>(
        &self,
        template_type: TemplateType,
        part: TemplatePart,
        model: &M,
    ) -> CourierResult<String> {
        let override_text = self
            .overrides
            .get(&template_type)
            .and_then(|entry| entry.get(part));

        self.render(
            template_type,
            &part.primary_path(template_type),
            &part.fallback_glob(template_type),
            model,
            override_text,
            part.autoescape(),
        )
    }

    /// Resolve and render a template.
    ///
    /// `primary_path` and `fallback_glob` are relative to the root. An override short-circuits
    /// file lookup entirely and is not rendered.
    pub fn render<M: Serialize + ?Sized>(
        &self,
        template_type: TemplateType,
        primary_path: &str,
        fallback_glob: &str,
        model: &M,
        override_text: Option<&str>,
        autoescape: bool,
    ) -> CourierResult<String> {
        if let Some(text) = override_text {
            debug!(template = %template_type, "Using configured template override");
            return Ok(text.to_string());
        }

        let path = self.resolve(template_type, primary_path, fallback_glob)?;
        debug!(template = %template_type, path = %path.display(), "Rendering template");

        let source = std::fs::read_to_string(&path).map_err(|e| CourierError::TemplateRender {
            template: template_type.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let context = Context::from_serialize(model).map_err(|e| CourierError::TemplateRender {
            template: template_type.to_string(),
            reason: error_chain(&e),
        })?;

        Tera::one_off(&source, &context, autoescape).map_err(|e| CourierError::TemplateRender {
            template: template_type.to_string(),
            reason: error_chain(&e),
        })
    }

    fn resolve(
        &self,
        template_type: TemplateType,
        primary_path: &str,
        fallback_glob: &str,
    ) -> CourierResult<PathBuf> {
        let primary = self.root.join(primary_path);
        if primary.is_file() {
            return Ok(primary);
        }

        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            fallback_glob
        );
        let entries = glob::glob(&pattern).map_err(|e| CourierError::TemplateRender {
            template: template_type.to_string(),
            reason: format!("invalid fallback pattern '{}': {}", fallback_glob, e),
        })?;

        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect();
        matches.sort();

        match matches.into_iter().next() {
            Some(path) => {
                debug!(
                    template = %template_type,
                    path = %path.display(),
                    "Primary template missing, using fallback match"
                );
                Ok(path)
            }
            None => Err(CourierError::TemplateNotFound {
                template: template_type.to_string(),
                path: primary_path.to_string(),
            }),
        }
    }
}

/// Tera hides the useful part of a failure in the source chain
fn error_chain(error: &tera::Error) -> String {
    let mut reason = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}
