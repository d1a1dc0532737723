//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::core::errors::{ConversionError, Result};
use crate::core::providers::ProviderKind;

/// Environment prefix for settings overrides
pub const ENV_PREFIX: &str = "CODE_CONVERSION";

/// Default cap on upload request bodies
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Endpoint and model for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Model name sent with every request
    pub model: String,
    /// API root, without a trailing slash
    pub api_base: String,
}

/// LLM selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider identifier, validated when a client is resolved
    pub provider: String,
    /// Sampling temperature, 0.0 to 2.0
    pub temperature: f32,
    /// OpenAI endpoint
    pub openai: ProviderEndpoint,
    /// Gemini endpoint
    pub gemini: ProviderEndpoint,
}

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Prefix all routes are mounted under
    pub base_path: String,
    /// Bind address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Largest accepted upload request body, in bytes
    pub max_upload_bytes: usize,
    /// Directory holding the prompt templates
    pub prompts_dir: PathBuf,
    /// Model selection
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_path: "/code-conversion".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            prompts_dir: PathBuf::from("prompts"),
            llm: LlmSettings {
                provider: "openai".to_string(),
                temperature: 0.1,
                openai: ProviderEndpoint {
                    model: "gpt-4o".to_string(),
                    api_base: "https://api.openai.com/v1".to_string(),
                },
                gemini: ProviderEndpoint {
                    model: "gemini-1.5-pro".to_string(),
                    api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                },
            },
        }
    }
}

impl Settings {
    /// Load settings from defaults, `config/settings.*` and `CODE_CONVERSION_*`
    /// environment variables, in increasing priority
    pub fn load() -> Result<Self> {
        let defaults = Settings::default();

        let settings: Settings = ::config::Config::builder()
            .set_default("base_path", defaults.base_path)?
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("max_upload_bytes", defaults.max_upload_bytes as i64)?
            .set_default("prompts_dir", defaults.prompts_dir.display().to_string())?
            .set_default("llm.provider", defaults.llm.provider)?
            .set_default("llm.temperature", f64::from(defaults.llm.temperature))?
            .set_default("llm.openai.model", defaults.llm.openai.model)?
            .set_default("llm.openai.api_base", defaults.llm.openai.api_base)?
            .set_default("llm.gemini.model", defaults.llm.gemini.model)?
            .set_default("llm.gemini.api_base", defaults.llm.gemini.api_base)?
            .add_source(::config::File::with_name("config/settings").required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        info!(
            "Loaded settings: provider={}, prompts_dir={}",
            settings.llm.provider,
            settings.prompts_dir.display()
        );

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.prompts_dir.as_os_str().is_empty() {
            return Err(config_error("prompts_dir must not be empty"));
        }

        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(config_error("base_path must start with '/'"));
        }

        if self.max_upload_bytes == 0 {
            return Err(config_error("max_upload_bytes must be greater than zero"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(config_error("llm.temperature must be between 0.0 and 2.0"));
        }

        if !self.prompts_dir.is_dir() {
            warn!("Prompts directory {} does not exist", self.prompts_dir.display());
        }

        Ok(())
    }
}

fn config_error(message: &str) -> ConversionError {
    ConversionError::ConfigError {
        message: message.to_string(),
    }
}

/// API key that never shows up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key, for request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Provider API keys captured from the environment, keyed by variable name
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<String, ApiKey>,
}

impl Credentials {
    /// Snapshot the credential variable of every supported provider; empty
    /// values count as absent
    pub fn from_env() -> Self {
        let keys = ProviderKind::ALL
            .iter()
            .map(|kind| kind.api_key_env())
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
                    .map(|value| (name.to_string(), ApiKey::new(value)))
            })
            .collect();

        Self { keys }
    }

    /// Add or replace the key stored under `env_var`
    pub fn with(mut self, env_var: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(env_var.into(), ApiKey::new(key));
        self
    }

    /// Key stored under `env_var`, if any
    pub fn get(&self, env_var: &str) -> Option<&ApiKey> {
        self.keys.get(env_var)
    }
}
