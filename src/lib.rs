//! Code Converter - LLM-backed COBOL conversion library
//!
//! This library renders COBOL sources into translation prompts, sends them to a
//! hosted model, and recovers the converted code from the completion. It also
//! provides the HTTP API service and CLI built on that pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod core;
pub mod server;

// Re-export key types for convenience
pub use crate::core::{
    config::{Credentials, Settings},
    errors::{ConversionError, ErrorCategory},
    models::{ConversionResult, TargetLanguage, TranslationRequest},
    pipeline::CodeConverter,
    providers::{ClientResolver, InferenceClient, ProviderKind, ProviderResolver},
    templates::{PromptTemplate, TemplateStore},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
