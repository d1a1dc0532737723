//! OpenAI chat completions client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{error_message, InferenceClient};
use crate::core::config::{ApiKey, ProviderEndpoint};
use crate::core::errors::{ConversionError, Result};
use crate::core::models::RawCompletion;

const PROVIDER: &str = "openai";

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Client for `POST {api_base}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: ApiKey,
}

impl OpenAiClient {
    /// Client sharing `http`'s connection pool
    pub fn new(http: reqwest::Client, endpoint: &ProviderEndpoint, temperature: f32, api_key: ApiKey) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", endpoint.api_base.trim_end_matches('/')),
            model: endpoint.model.clone(),
            temperature,
            api_key,
        }
    }

    /// Model name sent with each request
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn invoke(&self, prompt: &str) -> Result<RawCompletion> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ConversionError::provider(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("OpenAI returned {}: {}", status, error_text);
            return Err(ConversionError::provider(
                PROVIDER,
                format!("{} - {}", status.as_u16(), error_message(&error_text)),
            ));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ConversionError::provider(PROVIDER, format!("invalid response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(RawCompletion)
            .ok_or_else(|| ConversionError::provider(PROVIDER, "no completion in response"))
    }
}
