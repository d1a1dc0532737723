//! Prompt template loading and rendering

use regex::{NoExpand, Regex};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::core::errors::{ConversionError, Result};
use crate::core::models::{RenderedPrompt, TargetLanguage};

/// Name of the single substitution variable templates may use
pub const SOURCE_PLACEHOLDER: &str = "source_code";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*source_code\s*\}\}").expect("placeholder pattern is a valid regex")
    })
}

/// A named prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Template file name, for logs
    pub name: String,
    /// Raw template text
    pub content: String,
}

impl PromptTemplate {
    /// Template from already-loaded text
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Number of `{{ source_code }}` sites in the template
    pub fn placeholder_count(&self) -> usize {
        placeholder().find_iter(&self.content).count()
    }

    /// Substitute the source text verbatim at the placeholder
    pub fn render(&self, source_text: &str) -> RenderedPrompt {
        let sites = self.placeholder_count();
        if sites != 1 {
            warn!(
                "Template {} has {} `{{{{ {} }}}}` placeholders, expected exactly one",
                self.name, sites, SOURCE_PLACEHOLDER
            );
        }

        RenderedPrompt(
            placeholder()
                .replace_all(&self.content, NoExpand(source_text))
                .into_owned(),
        )
    }
}

/// File-backed template lookup keyed by target language
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    /// Store reading templates from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory templates are read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the template backing `target`
    pub fn path_for(&self, target: TargetLanguage) -> PathBuf {
        self.dir.join(target.template_file())
    }

    /// Read the template for `target` from disk
    pub async fn load(&self, target: TargetLanguage) -> Result<PromptTemplate> {
        let path = self.path_for(target);

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Loaded template {} ({} bytes)", path.display(), content.len());
                Ok(PromptTemplate::new(target.template_file(), content))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ConversionError::TemplateNotFound {
                path: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the template for `target` and fill it with `source_text`
    pub async fn render(&self, target: TargetLanguage, source_text: &str) -> Result<RenderedPrompt> {
        let template = self.load(target).await?;
        Ok(template.render(source_text))
    }
}
