//! End-to-end conversion of one request

use std::sync::Arc;
use tracing::{error, info};

use crate::core::config::{Credentials, Settings};
use crate::core::errors::Result;
use crate::core::extractor;
use crate::core::models::{ConversionResult, TranslationRequest};
use crate::core::providers::{self, ClientResolver, ProviderResolver};
use crate::core::templates::TemplateStore;

/// Resolve, render, invoke, extract
#[derive(Clone)]
pub struct CodeConverter {
    templates: TemplateStore,
    resolver: Arc<dyn ClientResolver>,
}

impl CodeConverter {
    /// Converter over explicit templates and resolver
    pub fn new(templates: TemplateStore, resolver: Arc<dyn ClientResolver>) -> Self {
        Self { templates, resolver }
    }

    /// Build from loaded settings and the process environment
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let resolver = ProviderResolver::new(settings.llm.clone(), Credentials::from_env())?;
        Ok(Self::new(
            TemplateStore::new(settings.prompts_dir.clone()),
            Arc::new(resolver),
        ))
    }

    /// Template store in use
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Convert one request. Unparseable completions come back as
    /// [`ConversionResult::Degraded`], not as errors.
    pub async fn convert(&self, request: &TranslationRequest) -> Result<ConversionResult> {
        let target = request.target_language;
        info!(
            "Converting {} characters of COBOL to {}",
            request.source_text.chars().count(),
            target
        );

        let result = self.run(request).await;
        match &result {
            Ok(ConversionResult::Converted { .. }) => info!("Conversion to {} succeeded", target),
            Ok(ConversionResult::Degraded { .. }) => info!("Conversion to {} returned an unstructured completion", target),
            Err(e) => error!("Conversion to {} failed: {}", target, e),
        }
        result
    }

    async fn run(&self, request: &TranslationRequest) -> Result<ConversionResult> {
        let client = self.resolver.resolve()?;
        let prompt = self
            .templates
            .render(request.target_language, &request.source_text)
            .await?;
        let completion = providers::invoke(client.as_ref(), &prompt).await?;
        Ok(extractor::extract(completion))
    }
}
