//! Recovery of structured output from free-text completions
//!
//! Prompts ask the model to answer with a single fenced block:
//!
//! ````text
//! ```json
//! {"code": "..."}
//! ```
//! ````
//!
//! Nothing forces the model to comply, so extraction never fails. Anything that
//! does not match the contract is returned as a degraded result carrying the
//! complete raw completion.

use std::fmt;
use tracing::{debug, warn};

use crate::core::models::{ConversionResult, RawCompletion};

/// Marker opening the structured block
pub const OPENING_FENCE: &str = "```json";
/// Marker closing the structured block
pub const CLOSING_FENCE: &str = "```";
/// Mandatory field in the structured block
pub const CODE_FIELD: &str = "code";

/// Reason a completion was degraded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No opening fence anywhere in the completion
    NoFence,
    /// Opening fence without a closing one, usually a truncated reply
    Unterminated,
    /// Block content is not JSON; carries the parser message
    InvalidJson(String),
    /// JSON without a string `code` field
    MissingCode,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoFence => write!(f, "no {OPENING_FENCE} block found"),
            Rejection::Unterminated => write!(f, "{OPENING_FENCE} block is never closed"),
            Rejection::InvalidJson(e) => write!(f, "block is not valid JSON: {e}"),
            Rejection::MissingCode => write!(f, "block has no string `{CODE_FIELD}` field"),
        }
    }
}

/// Text between the first opening fence and the next closing fence
pub fn fenced_block(raw: &str) -> Result<&str, Rejection> {
    let start = raw.find(OPENING_FENCE).ok_or(Rejection::NoFence)? + OPENING_FENCE.len();
    let rest = &raw[start..];
    let end = rest.find(CLOSING_FENCE).ok_or(Rejection::Unterminated)?;
    Ok(rest[..end].trim())
}

/// Parse the first fenced block and pull out its `code` field
pub fn extract_code(raw: &str) -> Result<String, Rejection> {
    let block = fenced_block(raw)?;
    let value: serde_json::Value =
        serde_json::from_str(block).map_err(|e| Rejection::InvalidJson(e.to_string()))?;

    value
        .get(CODE_FIELD)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or(Rejection::MissingCode)
}

/// Turn a completion into the caller-facing result
pub fn extract(raw: RawCompletion) -> ConversionResult {
    match extract_code(raw.as_str()) {
        Ok(code) => {
            debug!("Extracted {} characters of code", code.len());
            ConversionResult::Converted { code }
        }
        Err(rejection) => {
            warn!("Returning unstructured completion: {}", rejection);
            ConversionResult::degraded(raw.into_inner())
        }
    }
}
