//! Custom error types for conversion operations

use thiserror::Error;

/// Broad classification used to pick a status code and log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller sent something we cannot convert
    InvalidRequest,
    /// The deployment is misconfigured (provider, credentials, settings)
    Configuration,
    /// Something failed while serving a valid request
    Internal,
}

impl ErrorCategory {
    /// Stable identifier exposed in error bodies
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::InvalidRequest => "invalid_request_error",
            ErrorCategory::Configuration => "configuration_error",
            ErrorCategory::Internal => "internal_error",
        }
    }
}

/// Conversion-related errors
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Uploaded file does not carry a COBOL extension
    #[error("Only COBOL files (.cob, .cbl) are supported.")]
    UnsupportedFileType {
        /// Name the client sent
        filename: String,
    },

    /// Upload could not be decoded into source text
    #[error("Invalid upload: {message}")]
    InvalidUpload {
        /// What was wrong with the form
        message: String,
    },

    /// Upload body is larger than the configured limit
    #[error("Uploaded file exceeds the {limit} byte limit.")]
    UploadTooLarge {
        /// Limit in bytes
        limit: usize,
    },

    /// No template file exists for the requested target
    #[error("Prompt template not found at {path}")]
    TemplateNotFound {
        /// Path that was looked up
        path: String,
    },

    /// Configured provider identifier is outside the supported set
    #[error("LLM provider '{provider}' not supported.")]
    UnsupportedProvider {
        /// Identifier as configured
        provider: String,
    },

    /// Credential for the configured provider is absent
    #[error("{env_var} environment variable not set.")]
    MissingCredential {
        /// Provider that needed the key
        provider: String,
        /// Variable the key is read from
        env_var: String,
    },

    /// Inference call failed upstream
    #[error("Provider {provider} invocation failed: {message}")]
    ProviderInvocationFailed {
        /// Provider that failed
        provider: String,
        /// Upstream error text
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// What is wrong
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConversionError {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConversionError::UnsupportedFileType { .. }
            | ConversionError::InvalidUpload { .. }
            | ConversionError::UploadTooLarge { .. } => ErrorCategory::InvalidRequest,
            ConversionError::UnsupportedProvider { .. }
            | ConversionError::MissingCredential { .. }
            | ConversionError::ConfigError { .. } => ErrorCategory::Configuration,
            ConversionError::TemplateNotFound { .. }
            | ConversionError::ProviderInvocationFailed { .. }
            | ConversionError::IoError(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            ConversionError::UnsupportedFileType { .. } | ConversionError::InvalidUpload { .. } => 400,
            ConversionError::UploadTooLarge { .. } => 413,
            ConversionError::UnsupportedProvider { .. } => 501,
            _ => 500,
        }
    }

    /// Shorthand for a provider failure
    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        ConversionError::ProviderInvocationFailed {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

impl From<::config::ConfigError> for ConversionError {
    fn from(err: ::config::ConfigError) -> Self {
        ConversionError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConversionError>;
