//! Core data models for code conversion

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::{ConversionError, Result};

/// Filename suffixes accepted as COBOL source
pub const SOURCE_EXTENSIONS: &[&str] = &[".cob", ".cbl"];

/// Check whether a filename carries a recognized COBOL extension
pub fn is_cobol_file(filename: &str) -> bool {
    SOURCE_EXTENSIONS.iter().any(|ext| filename.ends_with(ext))
}

/// Language the source is converted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    /// Java
    Java,
    /// Python
    Python,
}

impl TargetLanguage {
    /// All supported targets
    pub const ALL: &'static [TargetLanguage] = &[TargetLanguage::Java, TargetLanguage::Python];

    /// Template file backing this target, relative to the prompts directory
    pub fn template_file(self) -> &'static str {
        match self {
            TargetLanguage::Java => "to_java.jinja",
            TargetLanguage::Python => "to_python.jinja",
        }
    }

    /// File extension used when writing converted output
    pub fn file_extension(self) -> &'static str {
        match self {
            TargetLanguage::Java => "java",
            TargetLanguage::Python => "py",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetLanguage::Java => write!(f, "Java"),
            TargetLanguage::Python => write!(f, "Python"),
        }
    }
}

impl FromStr for TargetLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "java" => Ok(TargetLanguage::Java),
            "python" | "py" => Ok(TargetLanguage::Python),
            other => Err(format!("unknown target language '{other}' (expected java or python)")),
        }
    }
}

/// Translation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    /// COBOL source, as uploaded
    pub source_text: String,
    /// Language to convert into
    pub target_language: TargetLanguage,
}

impl TranslationRequest {
    /// Request over already-decoded source text
    pub fn new(source_text: impl Into<String>, target_language: TargetLanguage) -> Self {
        Self {
            source_text: source_text.into(),
            target_language,
        }
    }

    /// Build a request from an uploaded file, enforcing the COBOL extension
    /// and UTF-8 content
    pub fn from_upload(
        filename: &str,
        contents: Vec<u8>,
        target_language: TargetLanguage,
    ) -> Result<Self> {
        ensure_cobol_file(filename)?;

        if contents.is_empty() {
            return Err(ConversionError::InvalidUpload {
                message: format!("{filename} is empty"),
            });
        }

        let source_text = String::from_utf8(contents).map_err(|e| ConversionError::InvalidUpload {
            message: format!("{filename} is not valid UTF-8: {e}"),
        })?;

        Ok(Self::new(source_text, target_language))
    }
}

/// Reject filenames without a COBOL extension
pub fn ensure_cobol_file(filename: &str) -> Result<()> {
    if is_cobol_file(filename) {
        Ok(())
    } else {
        Err(ConversionError::UnsupportedFileType {
            filename: filename.to_string(),
        })
    }
}

/// Prompt with the template placeholder substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt(pub String);

impl RenderedPrompt {
    /// Prompt text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Unparsed completion text returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCompletion(pub String);

impl RawCompletion {
    /// Completion text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the completion text
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Why a completion could not be turned into structured output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionFailure {
    /// No usable JSON block
    #[serde(rename = "Failed to parse JSON")]
    ParseFailure,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionFailure::ParseFailure => write!(f, "parse_failure"),
        }
    }
}

/// Outcome of a conversion, serialized as the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConversionResult {
    /// Code extracted from a well-formed completion
    Converted {
        /// Converted source
        code: String,
    },
    /// Completion kept verbatim because it could not be parsed
    Degraded {
        /// Always the parse-failure marker
        error: ExtractionFailure,
        /// Completion text, unmodified
        raw_response: String,
    },
}

impl ConversionResult {
    /// Fallback outcome preserving the full completion
    pub fn degraded(raw_response: impl Into<String>) -> Self {
        ConversionResult::Degraded {
            error: ExtractionFailure::ParseFailure,
            raw_response: raw_response.into(),
        }
    }

    /// True for the fallback outcome
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConversionResult::Degraded { .. })
    }
}
