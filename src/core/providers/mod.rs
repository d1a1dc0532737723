//! Inference providers and client resolution
//!
//! Every provider is reduced to a single capability, [`InferenceClient::invoke`],
//! so the rest of the pipeline never branches on which provider is configured.

pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::config::{Credentials, LlmSettings};
use crate::core::errors::{ConversionError, Result};
use crate::core::models::{RawCompletion, RenderedPrompt};

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// A hosted model that turns a prompt into completion text
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Provider identifier, for logs
    fn provider(&self) -> &str;

    /// Send one prompt and return the raw completion
    async fn invoke(&self, prompt: &str) -> Result<RawCompletion>;
}

/// Something that can hand out an inference client for a request
pub trait ClientResolver: Send + Sync {
    /// Client for the configured provider, or the configuration error
    fn resolve(&self) -> Result<Arc<dyn InferenceClient>>;
}

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI chat completions
    OpenAi,
    /// Google Gemini
    Gemini,
}

impl ProviderKind {
    /// Every supported provider
    pub const ALL: &'static [ProviderKind] = &[ProviderKind::OpenAi, ProviderKind::Gemini];

    /// Identifier as used in configuration
    pub const fn name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Environment variable holding the API key
    pub const fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| ConversionError::UnsupportedProvider { provider: lower })
    }
}

/// Build the client for the configured provider.
///
/// Fails before any network traffic when the provider is unknown or its
/// credential is missing.
pub fn resolve(
    settings: &LlmSettings,
    credentials: &Credentials,
    http: &reqwest::Client,
) -> Result<Arc<dyn InferenceClient>> {
    let kind: ProviderKind = settings.provider.parse()?;

    let api_key = credentials
        .get(kind.api_key_env())
        .cloned()
        .ok_or_else(|| ConversionError::MissingCredential {
            provider: kind.name().to_string(),
            env_var: kind.api_key_env().to_string(),
        })?;

    let client: Arc<dyn InferenceClient> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(
            http.clone(),
            &settings.openai,
            settings.temperature,
            api_key,
        )),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(
            http.clone(),
            &settings.gemini,
            settings.temperature,
            api_key,
        )),
    };

    debug!("Resolved inference client for provider {}", kind);
    Ok(client)
}

/// Resolver backed by process settings and environment credentials
#[derive(Debug, Clone)]
pub struct ProviderResolver {
    settings: LlmSettings,
    credentials: Credentials,
    http: reqwest::Client,
}

impl ProviderResolver {
    /// Resolver with its own pooled HTTP client
    pub fn new(settings: LlmSettings, credentials: Credentials) -> Result<Self> {
        // No request timeout: callers needing one enforce it at the transport layer.
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ConversionError::ConfigError {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        info!(
            "Provider resolver ready: provider={}, temperature={}",
            settings.provider, settings.temperature
        );

        Ok(Self {
            settings,
            credentials,
            http,
        })
    }
}

impl ClientResolver for ProviderResolver {
    fn resolve(&self) -> Result<Arc<dyn InferenceClient>> {
        resolve(&self.settings, &self.credentials, &self.http)
    }
}

/// Run one prompt through `client`. Failures pass through untouched.
pub async fn invoke(client: &dyn InferenceClient, prompt: &RenderedPrompt) -> Result<RawCompletion> {
    debug!(
        "Invoking {} with a {} character prompt",
        client.provider(),
        prompt.as_str().chars().count()
    );

    let completion = client.invoke(prompt.as_str()).await?;

    debug!(
        "{} returned {} characters",
        client.provider(),
        completion.as_str().chars().count()
    );
    Ok(completion)
}

/// Extract a human-readable message from a provider error body
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
